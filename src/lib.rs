//! vpn-pk - privileged launcher for OpenVPN client profiles
//!
//! This crate is the small setuid/sudo/pkexec side of a VPN client. The
//! unprivileged desktop or CLI client asks it to start, stop, or authorize
//! a profile; it validates every argument before acting with elevated
//! privileges.
//!
//! # Architecture
//!
//! - `config`: Configuration file handling (TOML)
//! - `profile`: Profile path validation and content digests
//! - `autostart`: Content-addressed autostart allowlist
//! - `launch`: Credentials handoff and client supervision
//! - `platform`: Process table access (procfs on Linux)
//! - `stop`: Identity check and bounded termination of clients
//! - `commands`: The privileged commands wired together
//!
//! # Usage
//!
//! ```bash
//! pkexec vpn-pk start ~/.config/pritunl_client/profiles/<id>.ovpn /tmp/creds
//! pkexec vpn-pk stop <pid>
//! ```

#[cfg(not(unix))]
compile_error!("vpn-pk only supports Unix platforms");

pub mod autostart;
pub mod commands;
pub mod config;
pub mod launch;
pub mod platform;
pub mod profile;
pub mod stop;

pub use autostart::AutostartRegistry;
pub use commands::{CommandError, Helper, LaunchMode};
pub use config::HelperConfig;
pub use profile::{ProfileDigest, ProfileValidator};
pub use stop::StopOutcome;
