//! Content-addressed autostart allowlist
//!
//! Each authorized profile is represented by an empty marker file named
//! after the SHA-1 of the profile's contents, e.g.
//! `/etc/pritunl_client/a9993e364706816aba3e25717850c26c9cd0d89d`.
//! Editing a profile changes its digest, which silently revokes it.

use crate::profile::ProfileDigest;
use std::fs::{self, DirBuilder, OpenOptions};
use std::io;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Autostart registry I/O failed at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

pub struct AutostartRegistry {
    root: PathBuf,
}

impl AutostartRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn marker_path(&self, digest: &ProfileDigest) -> PathBuf {
        self.root.join(digest.as_str())
    }

    /// Authorize the given profile contents for autostart
    ///
    /// Creates the registry directory (mode 0700) if needed. Authorizing the
    /// same contents twice is a no-op.
    pub fn authorize(&self, content: &[u8]) -> Result<ProfileDigest, RegistryError> {
        let digest = ProfileDigest::of(content);

        DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&self.root)
            .map_err(|source| RegistryError::Io {
                path: self.root.clone(),
                source,
            })?;

        let marker = self.marker_path(&digest);
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&marker)
            .map_err(|source| RegistryError::Io {
                path: marker.clone(),
                source,
            })?;

        info!("Authorized profile {} for autostart", digest);
        Ok(digest)
    }

    /// Revoke an authorization; revoking an unknown digest succeeds
    pub fn revoke(&self, digest: &ProfileDigest) -> Result<(), RegistryError> {
        let marker = self.marker_path(digest);
        match fs::remove_file(&marker) {
            Ok(()) => {
                info!("Revoked autostart for profile {}", digest);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No autostart marker for {}, nothing to revoke", digest);
                Ok(())
            }
            Err(source) => Err(RegistryError::Io {
                path: marker,
                source,
            }),
        }
    }

    /// Check whether these exact contents are authorized
    ///
    /// Fails closed: any error while probing the marker means "no".
    pub fn is_authorized(&self, content: &[u8]) -> bool {
        self.contains(&ProfileDigest::of(content))
    }

    pub fn contains(&self, digest: &ProfileDigest) -> bool {
        let marker = self.marker_path(digest);
        match fs::symlink_metadata(&marker) {
            Ok(metadata) => metadata.is_file(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!("Cannot check autostart marker {}: {}", marker.display(), e);
                false
            }
        }
    }

    /// List all authorized digests, sorted
    ///
    /// Entries that are not well-formed digests are ignored.
    pub fn list(&self) -> Result<Vec<ProfileDigest>, RegistryError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(RegistryError::Io {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut digests = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| RegistryError::Io {
                path: self.root.clone(),
                source,
            })?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Ok(digest) = name.parse::<ProfileDigest>() {
                if self.contains(&digest) {
                    digests.push(digest);
                }
            }
        }

        digests.sort();
        Ok(digests)
    }
}
