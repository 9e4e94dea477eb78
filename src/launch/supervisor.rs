//! VPN client process supervision
//!
//! The helper blocks for the whole lifetime of the client. Termination
//! requests reach the supervisor through a channel: in production the
//! channel is fed by a [`SignalWatcher`] listening for SIGINT/SIGTERM,
//! in tests it is fed directly.

use crate::config::ClientConfig;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::ffi::OsString;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use thiserror::Error;
use tokio::process::Command;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Failed to spawn {executable}: {source}")]
    SpawnFailure { executable: PathBuf, source: io::Error },
    #[error("Failed to wait for VPN client: {0}")]
    Wait(io::Error),
    #[error("Failed to install signal handlers: {0}")]
    SignalSetup(io::Error),
}

/// Forwards SIGINT and SIGTERM received by the helper into a channel
///
/// Handlers are registered on `install`; the forwarding task stops when
/// the watcher is dropped.
pub struct SignalWatcher {
    task: JoinHandle<()>,
}

impl SignalWatcher {
    pub fn install() -> Result<(Self, mpsc::Receiver<Signal>), LaunchError> {
        let mut sigint = signal(SignalKind::interrupt()).map_err(LaunchError::SignalSetup)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(LaunchError::SignalSetup)?;
        let (tx, rx) = mpsc::channel(8);

        let task = tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    Some(()) = sigint.recv() => Signal::SIGINT,
                    Some(()) = sigterm.recv() => Signal::SIGTERM,
                    else => break,
                };
                debug!("Received {}", received);
                if tx.send(received).await.is_err() {
                    break;
                }
            }
        });

        Ok((Self { task }, rx))
    }
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct Supervisor {
    executable: PathBuf,
    args: Vec<String>,
}

impl Supervisor {
    pub fn new(client: &ClientConfig) -> Self {
        Self {
            executable: client.executable.clone(),
            args: client.args.clone(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Argument vector passed to the client, excluding the executable
    pub fn command_args(&self, profile: &Path, credentials: Option<&Path>) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        args.push("--config".into());
        args.push(profile.into());
        if let Some(credentials) = credentials {
            args.push("--auth-user-pass".into());
            args.push(credentials.into());
        }
        args
    }

    /// Spawn the client and block until it exits
    ///
    /// Every signal received on `signals` is forwarded unchanged to the
    /// client. Returns the client's exit code, or 128 + N if it was killed
    /// by signal N.
    pub async fn run(
        &self,
        profile: &Path,
        credentials: Option<&Path>,
        mut signals: mpsc::Receiver<Signal>,
    ) -> Result<i32, LaunchError> {
        let args = self.command_args(profile, credentials);

        let mut child = Command::new(&self.executable)
            .args(&args)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LaunchError::SpawnFailure {
                executable: self.executable.clone(),
                source,
            })?;

        let pid = child.id().map(|id| Pid::from_raw(id as i32));
        info!(
            "Started {} (pid {:?}) with profile {}",
            self.executable.display(),
            pid,
            profile.display()
        );

        let status = loop {
            tokio::select! {
                biased;
                status = child.wait() => break status.map_err(LaunchError::Wait)?,
                Some(received) = signals.recv() => {
                    if let Some(pid) = pid {
                        forward_signal(pid, received);
                    }
                }
            }
        };

        let code = exit_code(status);
        info!("VPN client exited with code {}", code);
        Ok(code)
    }
}

fn forward_signal(pid: Pid, received: Signal) {
    match kill(pid, received) {
        Ok(()) => info!("Forwarded {} to VPN client {}", received, pid),
        Err(Errno::ESRCH) => debug!("VPN client {} already exited", pid),
        Err(e) => warn!("Failed to forward {} to {}: {}", received, pid, e),
    }
}

pub fn exit_code(status: ExitStatus) -> i32 {
    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Supervisor running `/bin/sh -c <script> vpn --config ...`
    fn shell_supervisor(script: String) -> Supervisor {
        Supervisor::new(&ClientConfig {
            executable: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), script, "vpn".to_string()],
        })
    }

    fn no_signals() -> mpsc::Receiver<Signal> {
        let (_tx, rx) = mpsc::channel(1);
        rx
    }

    async fn wait_for_file(path: &Path) {
        for _ in 0..250 {
            if path.exists() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("{} never appeared", path.display());
    }

    #[test]
    fn test_command_args_without_credentials() {
        let supervisor = Supervisor::new(&ClientConfig::default());
        let args = supervisor.command_args(Path::new("/h/pritunl_client/profiles/a.ovpn"), None);

        assert_eq!(supervisor.executable(), Path::new("/usr/sbin/openvpn"));
        assert_eq!(
            args,
            vec![
                OsString::from("--config"),
                OsString::from("/h/pritunl_client/profiles/a.ovpn"),
            ]
        );
    }

    #[test]
    fn test_command_args_with_credentials_and_prefix() {
        let supervisor = Supervisor::new(&ClientConfig {
            executable: PathBuf::from("/usr/sbin/openvpn"),
            args: vec!["--verb".to_string(), "3".to_string()],
        });
        let args = supervisor.command_args(
            Path::new("/h/pritunl_client/profiles/a.ovpn"),
            Some(Path::new("/tmp/creds")),
        );

        assert_eq!(
            args,
            vec![
                OsString::from("--verb"),
                OsString::from("3"),
                OsString::from("--config"),
                OsString::from("/h/pritunl_client/profiles/a.ovpn"),
                OsString::from("--auth-user-pass"),
                OsString::from("/tmp/creds"),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_propagates_exit_code_and_args() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("args.txt");
        let supervisor = shell_supervisor(format!(
            "printf '%s\\n' \"$@\" > '{}'; exit 3",
            out.display()
        ));

        let code = supervisor
            .run(
                Path::new("/h/pritunl_client/profiles/a.ovpn"),
                Some(Path::new("/tmp/creds")),
                no_signals(),
            )
            .await
            .unwrap();

        assert_eq!(code, 3);
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "--config\n/h/pritunl_client/profiles/a.ovpn\n--auth-user-pass\n/tmp/creds\n"
        );
    }

    #[tokio::test]
    async fn test_run_missing_executable_is_spawn_failure() {
        let supervisor = Supervisor::new(&ClientConfig {
            executable: PathBuf::from("/nonexistent/bin/openvpn"),
            args: Vec::new(),
        });

        let result = supervisor
            .run(Path::new("/h/pritunl_client/profiles/a.ovpn"), None, no_signals())
            .await;

        assert!(matches!(result, Err(LaunchError::SpawnFailure { .. })));
    }

    #[tokio::test]
    async fn test_run_forwards_signal_to_client() {
        let temp_dir = TempDir::new().unwrap();
        let ready = temp_dir.path().join("ready");
        let supervisor = shell_supervisor(format!(
            "trap 'exit 42' INT; : > '{}'; while :; do sleep 0.05; done",
            ready.display()
        ));
        let (tx, rx) = mpsc::channel(4);

        let handle = tokio::spawn(async move {
            supervisor
                .run(Path::new("/h/pritunl_client/profiles/a.ovpn"), None, rx)
                .await
        });

        wait_for_file(&ready).await;
        tx.send(Signal::SIGINT).await.unwrap();

        let code = tokio::time::timeout(Duration::from_secs(10), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(code, 42);
    }

    #[tokio::test]
    async fn test_signal_watcher_receives_process_signals() {
        let (_watcher, mut rx) = SignalWatcher::install().unwrap();

        nix::sys::signal::raise(Signal::SIGINT).unwrap();
        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(Signal::SIGINT));

        nix::sys::signal::raise(Signal::SIGTERM).unwrap();
        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(Signal::SIGTERM));
    }

    #[tokio::test]
    async fn test_run_reports_signal_death() {
        let supervisor = shell_supervisor("kill -KILL $$".to_string());

        let code = supervisor
            .run(Path::new("/h/pritunl_client/profiles/a.ovpn"), None, no_signals())
            .await
            .unwrap();

        assert_eq!(code, 128 + 9);
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(5 << 8)), 5);
        assert_eq!(exit_code(ExitStatus::from_raw(15)), 143);
    }
}
