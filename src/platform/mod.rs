//! Platform-specific process table access

#[cfg(target_os = "linux")]
pub mod linux;

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Unsupported platform")]
    UnsupportedPlatform,
}

/// Result of delivering a signal to a pid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalDelivery {
    Delivered,
    /// The process no longer exists
    Gone,
}

/// Platform-agnostic view of running processes
pub trait ProcessTable {
    /// Argument vector of `pid`, or `None` if the record is absent or unreadable
    fn cmdline(&self, pid: Pid) -> Option<Vec<String>>;
    fn exists(&self, pid: Pid) -> bool;
    fn signal(&self, pid: Pid, signal: Signal) -> Result<SignalDelivery, Errno>;
}

/// Get the process table for the current platform
pub fn get_process_table() -> Result<Box<dyn ProcessTable>, PlatformError> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::ProcFs::new()))
    }

    #[cfg(not(target_os = "linux"))]
    {
        Err(PlatformError::UnsupportedPlatform)
    }
}
