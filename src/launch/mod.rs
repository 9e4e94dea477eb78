//! Launching and supervising the VPN client
//!
//! # Lifecycle
//!
//! 1. The profile path has already been validated (and, for autostart,
//!    authorized) by the caller of this module.
//! 2. An optional credentials file is handed off to the helper: chowned,
//!    locked down, and scheduled for deletion.
//! 3. SIGINT/SIGTERM handlers are installed, the client is spawned, and
//!    every received signal is forwarded to it until it exits.
//! 4. The credentials file is removed on every exit path.

pub mod caller;
pub mod credentials;
pub mod supervisor;

pub use caller::Caller;
pub use credentials::{CredentialError, CredentialHandoff};
pub use supervisor::{LaunchError, SignalWatcher, Supervisor};
