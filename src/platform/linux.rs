//! Linux process table backed by procfs

use super::{ProcessTable, SignalDelivery};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs;
use std::path::PathBuf;

pub struct ProcFs {
    root: PathBuf,
}

impl ProcFs {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from("/proc"))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for ProcFs {
    fn cmdline(&self, pid: Pid) -> Option<Vec<String>> {
        let raw = fs::read(self.root.join(pid.to_string()).join("cmdline")).ok()?;
        Some(parse_cmdline(&raw))
    }

    fn exists(&self, pid: Pid) -> bool {
        self.root.join(pid.to_string()).exists()
    }

    fn signal(&self, pid: Pid, signal: Signal) -> Result<SignalDelivery, Errno> {
        match kill(pid, signal) {
            Ok(()) => Ok(SignalDelivery::Delivered),
            Err(Errno::ESRCH) => Ok(SignalDelivery::Gone),
            Err(e) => Err(e),
        }
    }
}

/// Split a NUL-separated `cmdline` record into arguments
///
/// Zombies and kernel threads have an empty record, which yields no
/// arguments.
pub fn parse_cmdline(raw: &[u8]) -> Vec<String> {
    raw.split(|byte| *byte == 0)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}
