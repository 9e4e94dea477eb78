//! Bounded SIGTERM loop for stopping a VPN client
//!
//! Signals are addressed by pid, and a pid can be reused as soon as the
//! client exits. The command line is therefore checked again before every
//! resend, and the loop ends as soon as the pid stops looking like a VPN
//! client. A pid recycled in the short gap between that check and `kill`
//! can still receive one SIGTERM.

use super::identity::is_vpn_client_process;
use crate::config::StopConfig;
use crate::platform::{ProcessTable, SignalDelivery};
use crate::profile::ProfileValidator;
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum StopError {
    #[error("Process {0} is not a VPN client process")]
    NotAVpnClientProcess(Pid),
    #[error("Failed to signal process {pid}: {source}")]
    Signal { pid: Pid, source: Errno },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl From<&StopConfig> for StopPolicy {
    fn from(config: &StopConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// There was no such process to begin with
    NotRunning,
    Stopped,
    /// The process outlived the timeout; there is no SIGKILL escalation
    StillRunning,
}

pub struct Terminator<'a> {
    table: &'a dyn ProcessTable,
    validator: &'a ProfileValidator,
    policy: StopPolicy,
}

impl<'a> Terminator<'a> {
    pub fn new(
        table: &'a dyn ProcessTable,
        validator: &'a ProfileValidator,
        policy: StopPolicy,
    ) -> Self {
        Self {
            table,
            validator,
            policy,
        }
    }

    pub async fn stop(&self, pid: Pid) -> Result<StopOutcome, StopError> {
        if self.table.cmdline(pid).is_none() {
            info!("Process {} is not running, nothing to stop", pid);
            return Ok(StopOutcome::NotRunning);
        }

        if !is_vpn_client_process(self.table, self.validator, pid) {
            return Err(StopError::NotAVpnClientProcess(pid));
        }

        let deadline = Instant::now() + self.policy.timeout;
        if self.terminate(pid)? == SignalDelivery::Gone {
            return Ok(StopOutcome::Stopped);
        }

        loop {
            sleep(self.policy.poll_interval).await;

            if !self.table.exists(pid) {
                info!("VPN client {} stopped", pid);
                return Ok(StopOutcome::Stopped);
            }
            if Instant::now() >= deadline {
                warn!(
                    "VPN client {} still running after {:?}, giving up",
                    pid, self.policy.timeout
                );
                return Ok(StopOutcome::StillRunning);
            }
            if !is_vpn_client_process(self.table, self.validator, pid) {
                info!("Process {} is no longer a VPN client, treating it as stopped", pid);
                return Ok(StopOutcome::Stopped);
            }
            if self.terminate(pid)? == SignalDelivery::Gone {
                return Ok(StopOutcome::Stopped);
            }
        }
    }

    fn terminate(&self, pid: Pid) -> Result<SignalDelivery, StopError> {
        let delivery = self
            .table
            .signal(pid, Signal::SIGTERM)
            .map_err(|source| StopError::Signal { pid, source })?;
        debug!("SIGTERM to {}: {:?}", pid, delivery);
        Ok(delivery)
    }
}
