//! Identity of the unprivileged user who invoked the helper
//!
//! When the helper runs setuid, the real uid is the caller. When it runs
//! with a real uid of 0, it was started by root directly or through an
//! escalation tool that records the original user in the environment.
//!
//! | Variable | Set by |
//! |----------|--------|
//! | `PKEXEC_UID` | pkexec |
//! | `SUDO_UID` / `SUDO_GID` | sudo |

use nix::unistd::{Gid, Uid, User};
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub uid: Uid,
    pub gid: Gid,
}

impl Caller {
    pub fn new(uid: Uid, gid: Gid) -> Self {
        Self { uid, gid }
    }

    /// Determine the caller of the current process
    pub fn detect() -> Self {
        Self::detect_with(Uid::current(), Gid::current(), |key| env::var(key))
    }

    /// Determine the caller using a custom environment getter (for testing)
    ///
    /// The environment is only consulted when the real uid is root; a
    /// setuid invocation could otherwise forge it.
    pub fn detect_with<F>(real_uid: Uid, real_gid: Gid, get_var: F) -> Self
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        if !real_uid.is_root() {
            return Self::new(real_uid, real_gid);
        }

        let parse_id = |key: &str| get_var(key).ok().and_then(|v| v.trim().parse::<u32>().ok());

        if let Some(uid) = parse_id("PKEXEC_UID") {
            let uid = Uid::from_raw(uid);
            let gid = User::from_uid(uid)
                .ok()
                .flatten()
                .map(|user| user.gid)
                .unwrap_or(real_gid);
            return Self::new(uid, gid);
        }

        if let Some(uid) = parse_id("SUDO_UID") {
            let gid = parse_id("SUDO_GID").map(Gid::from_raw).unwrap_or(real_gid);
            return Self::new(Uid::from_raw(uid), gid);
        }

        Self::new(real_uid, real_gid)
    }
}
