//! Transient credentials file handoff
//!
//! The unprivileged caller writes `username\npassword` to a temporary file
//! and passes its path. Before the client is allowed to read it, the file
//! is checked through a descriptor opened with `O_NOFOLLOW`, so the helper
//! can never be talked into chowning or deleting somebody else's file.
//! Once accepted, the file is removed when the handoff is dropped.
//!
//! Removal never re-resolves the original path. The parent directory is
//! held open from `prepare` onwards and the entry is unlinked relative to
//! that descriptor, and only while it still names the inode that was
//! checked. Swapping a parent directory for a symlink, or replacing the
//! file, while the client runs leaves the new target alone.

use super::Caller;
use nix::errno::Errno;
use nix::fcntl::AtFlags;
use nix::sys::stat::fstatat;
use nix::unistd::{unlinkat, Gid, Uid, UnlinkatFlags};
use std::ffi::{OsStr, OsString};
use std::fs::{File, Metadata, OpenOptions, Permissions};
use std::io;
use std::os::fd::AsRawFd;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Cannot open credentials file {path}: {source}")]
    Open { path: PathBuf, source: io::Error },
    #[error("Credentials file {0} is not a regular file")]
    NotRegularFile(PathBuf),
    #[error("Credentials file {0} has more than one hard link")]
    MultipleLinks(PathBuf),
    #[error("Credentials file {path} is owned by uid {owner}, expected caller uid {caller}")]
    NotOwnedByCaller { path: PathBuf, owner: u32, caller: u32 },
    #[error("Cannot hand off credentials file {path}: {source}")]
    Chown { path: PathBuf, source: io::Error },
    #[error("Credentials file {0} changed while it was being checked")]
    Replaced(PathBuf),
}

/// Scoped ownership of a credentials file
///
/// Dropping the handoff deletes the file, whatever happened in between.
#[derive(Debug)]
pub struct CredentialHandoff {
    path: PathBuf,
    /// Parent directory, opened with `O_DIRECTORY | O_NOFOLLOW`
    dir: File,
    name: OsString,
    dev: u64,
    ino: u64,
}

impl CredentialHandoff {
    /// Take over `path` for the lifetime of one client launch
    ///
    /// The file must be a regular, singly-linked file owned by `caller`.
    /// It is chowned to `owner_uid:owner_gid` and restricted to mode 0600.
    /// If any check fails the file is left untouched and not deleted.
    pub fn prepare(
        path: &Path,
        caller: &Caller,
        owner_uid: Uid,
        owner_gid: Gid,
    ) -> Result<Self, CredentialError> {
        let name = path
            .file_name()
            .ok_or_else(|| CredentialError::NotRegularFile(path.to_path_buf()))?
            .to_os_string();
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let dir = OpenOptions::new()
            .read(true)
            .custom_flags(nix::libc::O_DIRECTORY | nix::libc::O_NOFOLLOW)
            .open(parent)
            .map_err(|source| CredentialError::Open {
                path: parent.to_path_buf(),
                source,
            })?;

        let file = OpenOptions::new()
            .read(true)
            .custom_flags(nix::libc::O_NOFOLLOW | nix::libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| CredentialError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let metadata = check_file(&file, path, caller)?;
        ensure_same_entry(&dir, &name, &metadata, path)?;

        std::os::unix::fs::fchown(&file, Some(owner_uid.as_raw()), Some(owner_gid.as_raw()))
            .map_err(|source| CredentialError::Chown {
                path: path.to_path_buf(),
                source,
            })?;
        file.set_permissions(Permissions::from_mode(0o600))
            .map_err(|source| CredentialError::Chown {
                path: path.to_path_buf(),
                source,
            })?;

        info!(
            "Credentials file {} handed off to {}:{}",
            path.display(),
            owner_uid,
            owner_gid
        );

        Ok(Self {
            path: path.to_path_buf(),
            dir,
            name,
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn check_file(file: &File, path: &Path, caller: &Caller) -> Result<Metadata, CredentialError> {
    let metadata = file.metadata().map_err(|source| CredentialError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    if !metadata.is_file() {
        return Err(CredentialError::NotRegularFile(path.to_path_buf()));
    }
    if metadata.nlink() != 1 {
        return Err(CredentialError::MultipleLinks(path.to_path_buf()));
    }
    if metadata.uid() != caller.uid.as_raw() {
        return Err(CredentialError::NotOwnedByCaller {
            path: path.to_path_buf(),
            owner: metadata.uid(),
            caller: caller.uid.as_raw(),
        });
    }

    Ok(metadata)
}

/// The descriptor opened by path must be the entry held by `dir`
fn ensure_same_entry(
    dir: &File,
    name: &OsStr,
    metadata: &Metadata,
    path: &Path,
) -> Result<(), CredentialError> {
    let stat = fstatat(Some(dir.as_raw_fd()), name, AtFlags::AT_SYMLINK_NOFOLLOW).map_err(|errno| {
        CredentialError::Open {
            path: path.to_path_buf(),
            source: io::Error::from(errno),
        }
    })?;

    if stat.st_dev as u64 != metadata.dev() || stat.st_ino as u64 != metadata.ino() {
        return Err(CredentialError::Replaced(path.to_path_buf()));
    }
    Ok(())
}

impl Drop for CredentialHandoff {
    fn drop(&mut self) {
        let dirfd = Some(self.dir.as_raw_fd());

        match fstatat(dirfd, self.name.as_os_str(), AtFlags::AT_SYMLINK_NOFOLLOW) {
            Ok(stat) if stat.st_dev as u64 == self.dev && stat.st_ino as u64 == self.ino => {}
            Ok(_) => {
                warn!(
                    "Credentials file {} was replaced, leaving the new entry in place",
                    self.path.display()
                );
                return;
            }
            Err(Errno::ENOENT) => {
                debug!("Credentials file {} already gone", self.path.display());
                return;
            }
            Err(e) => {
                warn!(
                    "Failed to inspect credentials file {}: {}",
                    self.path.display(),
                    e
                );
                return;
            }
        }

        match unlinkat(dirfd, self.name.as_os_str(), UnlinkatFlags::NoRemoveDir) {
            Ok(()) => debug!("Removed credentials file {}", self.path.display()),
            Err(Errno::ENOENT) => {
                debug!("Credentials file {} already gone", self.path.display())
            }
            Err(e) => warn!(
                "Failed to remove credentials file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
