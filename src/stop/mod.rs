//! Stopping a running VPN client by pid
//!
//! The pid comes from an unprivileged caller, so it is only signalled after
//! its command line proves it is a client launched against a profile in the
//! expected directory.

pub mod identity;
pub mod terminator;

pub use identity::is_vpn_client_process;
pub use terminator::{StopError, StopOutcome, StopPolicy, Terminator};

#[cfg(test)]
pub(crate) mod testing {
    use crate::platform::{ProcessTable, SignalDelivery};
    use nix::errno::Errno;
    use nix::sys::signal::Signal;
    use nix::unistd::Pid;
    use std::sync::Mutex;

    /// Process table holding a single fake process that records signals
    pub struct MockProcessTable {
        pub pid: Pid,
        pub cmdline: Option<Vec<String>>,
        /// Number of signals after which the process disappears
        pub survives_signals: usize,
        /// Signal count after which `pid` belongs to another program
        pub replacement: Option<(usize, Vec<String>)>,
        pub fail_with: Option<Errno>,
        pub sent: Mutex<Vec<Signal>>,
    }

    impl MockProcessTable {
        pub fn new(pid: i32, cmdline: &[&str]) -> Self {
            Self {
                pid: Pid::from_raw(pid),
                cmdline: Some(cmdline.iter().map(|a| a.to_string()).collect()),
                survives_signals: usize::MAX,
                replacement: None,
                fail_with: None,
                sent: Mutex::new(Vec::new()),
            }
        }

        /// A table in which `pid` has no record at all
        pub fn absent(pid: i32) -> Self {
            Self {
                cmdline: None,
                ..Self::new(pid, &[])
            }
        }

        pub fn dies_after(mut self, signals: usize) -> Self {
            self.survives_signals = signals;
            self
        }

        /// After `signals` signals the pid is reused by a process running `cmdline`
        pub fn replaced_after(mut self, signals: usize, cmdline: &[&str]) -> Self {
            self.replacement = Some((signals, cmdline.iter().map(|a| a.to_string()).collect()));
            self
        }

        pub fn sent(&self) -> Vec<Signal> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl ProcessTable for MockProcessTable {
        fn cmdline(&self, pid: Pid) -> Option<Vec<String>> {
            if pid != self.pid || !self.exists(pid) {
                return None;
            }
            match &self.replacement {
                Some((after, cmdline)) if self.sent.lock().unwrap().len() >= *after => {
                    Some(cmdline.clone())
                }
                _ => self.cmdline.clone(),
            }
        }

        fn exists(&self, pid: Pid) -> bool {
            pid == self.pid
                && self.cmdline.is_some()
                && self.sent.lock().unwrap().len() < self.survives_signals
        }

        fn signal(&self, pid: Pid, signal: Signal) -> Result<SignalDelivery, Errno> {
            if let Some(errno) = self.fail_with {
                return Err(errno);
            }
            if !self.exists(pid) {
                return Ok(SignalDelivery::Gone);
            }
            self.sent.lock().unwrap().push(signal);
            Ok(SignalDelivery::Delivered)
        }
    }
}
