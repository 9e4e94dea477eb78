//! Privileged commands
//!
//! Each command validates all of its inputs before performing its single
//! privileged side effect: spawning the client, signalling a pid, or
//! mutating the autostart registry.
//!
//! # Error Handling
//!
//! Every failure surfaces as a [`CommandError`]; `main` logs it and exits
//! with status 1. Successful `start`/`autostart` runs exit with the
//! client's own status instead.

use crate::autostart::{AutostartRegistry, RegistryError};
use crate::config::HelperConfig;
use crate::launch::{
    Caller, CredentialError, CredentialHandoff, LaunchError, SignalWatcher, Supervisor,
};
use crate::platform::{PlatformError, ProcessTable};
use crate::profile::{ProfileDigest, ProfileError, ProfileValidator};
use crate::stop::{StopError, StopOutcome, StopPolicy, Terminator};
use nix::sys::signal::Signal;
use nix::unistd::{Gid, Pid, Uid};
use std::fs::OpenOptions;
use std::io::{self, Read};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error("Profile {0} is not authorized to autostart")]
    AutostartNotAuthorized(ProfileDigest),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Credentials(#[from] CredentialError),
    #[error(transparent)]
    Launch(#[from] LaunchError),
    #[error(transparent)]
    Stop(#[from] StopError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// How a client launch was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Started interactively by the user
    Start,
    /// Started unattended; requires a registry marker for the profile
    Autostart,
}

pub struct Helper {
    validator: ProfileValidator,
    registry: AutostartRegistry,
    supervisor: Supervisor,
    stop_policy: StopPolicy,
    caller: Caller,
}

impl Helper {
    pub fn new(config: &HelperConfig, caller: Caller) -> Self {
        Self {
            validator: ProfileValidator::new(config.profiles.app_dir.clone()),
            registry: AutostartRegistry::new(config.autostart.marker_dir.clone()),
            supervisor: Supervisor::new(&config.client),
            stop_policy: StopPolicy::from(&config.stop),
            caller,
        }
    }

    pub fn registry(&self) -> &AutostartRegistry {
        &self.registry
    }

    /// `start` / `autostart`: run the client until it exits
    pub async fn launch(
        &self,
        mode: LaunchMode,
        profile: &Path,
        credentials: Option<&Path>,
    ) -> Result<i32, CommandError> {
        let (watcher, signals) = SignalWatcher::install()?;
        let code = self.launch_with(mode, profile, credentials, signals).await;
        drop(watcher);
        code
    }

    /// Like [`Helper::launch`], with termination requests supplied by the caller
    pub async fn launch_with(
        &self,
        mode: LaunchMode,
        profile: &Path,
        credentials: Option<&Path>,
        signals: mpsc::Receiver<Signal>,
    ) -> Result<i32, CommandError> {
        self.validator.validate(profile)?;

        if mode == LaunchMode::Autostart {
            let content = read_profile(profile, &self.caller)?;
            let digest = ProfileDigest::of(&content);
            if !self.registry.contains(&digest) {
                return Err(CommandError::AutostartNotAuthorized(digest));
            }
            info!("Profile {} authorized for autostart ({})", profile.display(), digest);
        }

        let handoff = credentials
            .map(|path| {
                CredentialHandoff::prepare(path, &self.caller, Uid::effective(), Gid::effective())
            })
            .transpose()?;

        let code = self
            .supervisor
            .run(profile, handoff.as_ref().map(|h| h.path()), signals)
            .await?;
        Ok(code)
    }

    /// `stop`: terminate a client process by pid
    pub async fn stop(
        &self,
        table: &dyn ProcessTable,
        pid: Pid,
    ) -> Result<StopOutcome, CommandError> {
        let terminator = Terminator::new(table, &self.validator, self.stop_policy);
        Ok(terminator.stop(pid).await?)
    }

    /// `set-autostart`: authorize the profile's current contents
    pub fn set_autostart(&self, profile: &Path) -> Result<ProfileDigest, CommandError> {
        self.validator.validate(profile)?;
        let content = read_profile(profile, &self.caller)?;
        Ok(self.registry.authorize(&content)?)
    }

    /// `clear-autostart`: revoke a digest; unknown digests are fine
    pub fn clear_autostart(&self, identifier: &str) -> Result<(), CommandError> {
        let digest: ProfileDigest = identifier.parse()?;
        self.registry.revoke(&digest)?;
        Ok(())
    }

    pub fn list_autostart(&self) -> Result<Vec<ProfileDigest>, CommandError> {
        Ok(self.registry.list()?)
    }

    /// Digest of the profile's current contents, without authorizing it
    pub fn digest(&self, profile: &Path) -> Result<ProfileDigest, CommandError> {
        self.validator.validate(profile)?;
        let content = read_profile(profile, &self.caller)?;
        Ok(ProfileDigest::of(&content))
    }
}

/// Read a profile on behalf of `caller`
///
/// The helper can read any file, so the profile must be a regular file
/// owned by the caller and is never reached through a final symlink.
/// Otherwise the digest would disclose the contents of files the caller
/// cannot read.
fn read_profile(path: &Path, caller: &Caller) -> Result<Vec<u8>, ProfileError> {
    let read_error = |source: io::Error| ProfileError::ReadError {
        path: path.display().to_string(),
        source,
    };

    let mut file = OpenOptions::new()
        .read(true)
        .custom_flags(nix::libc::O_NOFOLLOW | nix::libc::O_NONBLOCK)
        .open(path)
        .map_err(|source| match source.raw_os_error() {
            Some(nix::libc::ELOOP) => ProfileError::NotRegularFile(path.display().to_string()),
            _ => read_error(source),
        })?;

    let metadata = file.metadata().map_err(read_error)?;
    if !metadata.is_file() {
        return Err(ProfileError::NotRegularFile(path.display().to_string()));
    }
    if metadata.uid() != caller.uid.as_raw() {
        return Err(ProfileError::NotOwnedByCaller {
            path: path.display().to_string(),
            owner: metadata.uid(),
            caller: caller.uid.as_raw(),
        });
    }

    let mut content = Vec::new();
    file.read_to_end(&mut content).map_err(read_error)?;
    Ok(content)
}
