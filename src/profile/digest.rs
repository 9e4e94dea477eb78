//! SHA-1 content digests used as autostart marker names

use super::ProfileError;
use sha1::{Digest, Sha1};
use std::fmt;
use std::str::FromStr;

const DIGEST_HEX_LEN: usize = 40;

/// Lowercase hex SHA-1 of a profile's full contents
///
/// Parsing only accepts exactly 40 lowercase hex characters, so a digest is
/// always safe to use as a single file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProfileDigest(String);

impl ProfileDigest {
    pub fn of(content: &[u8]) -> Self {
        Self(hex::encode(Sha1::digest(content)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ProfileDigest {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let well_formed = s.len() == DIGEST_HEX_LEN
            && s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(ProfileError::InvalidDigest(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for ProfileDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
