//! Profile references and content digests
//!
//! A profile is an OpenVPN config file owned by the unprivileged user. The
//! helper never trusts its location or contents: paths are checked
//! lexically by [`ProfileValidator`] and contents are identified by their
//! [`ProfileDigest`].

pub mod digest;
pub mod path;

pub use digest::ProfileDigest;
pub use path::ProfileValidator;

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Invalid profile path: {0}")]
    InvalidProfilePath(String),
    #[error("Invalid profile digest: {0:?}")]
    InvalidDigest(String),
    #[error("Failed to read profile {path}: {source}")]
    ReadError { path: String, source: io::Error },
    #[error("Profile {0} is not a regular file")]
    NotRegularFile(String),
    #[error("Profile {path} is owned by uid {owner}, expected caller uid {caller}")]
    NotOwnedByCaller { path: String, owner: u32, caller: u32 },
}
