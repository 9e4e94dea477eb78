//! Lexical validation of profile paths
//!
//! The profile path arrives as a positional argument from an unprivileged
//! caller and ends up on the VPN client's command line, so it must have
//! exactly this shape:
//!
//! ```text
//! /<any absolute prefix>/<app_dir>/profiles/<id>.ovpn      id = [a-z0-9]+
//! ```
//!
//! No filesystem access happens here; symlinks are not resolved.

use super::ProfileError;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Profile file name: lowercase alphanumeric id with the `.ovpn` extension
static PROFILE_FILE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+\.ovpn$").expect("profile file regex is valid"));

const PROFILES_DIR: &str = "profiles";

#[derive(Debug, Clone)]
pub struct ProfileValidator {
    app_dir: String,
}

impl ProfileValidator {
    pub fn new(app_dir: impl Into<String>) -> Self {
        Self {
            app_dir: app_dir.into(),
        }
    }

    pub fn app_dir(&self) -> &str {
        &self.app_dir
    }

    pub fn validate(&self, path: &Path) -> Result<(), ProfileError> {
        let text = path
            .to_str()
            .ok_or_else(|| invalid(path, "not valid UTF-8"))?;
        self.validate_str(text)
    }

    /// Validate a path given as text, e.g. an argument read from `/proc`
    pub fn validate_str(&self, text: &str) -> Result<(), ProfileError> {
        let path = Path::new(text);

        if !path.is_absolute() {
            return Err(invalid(path, "must be absolute"));
        }

        // Path::components() hides interior "." and "//", so inspect the raw segments
        let segments: Vec<&str> = text.split('/').skip(1).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(invalid(path, "must not contain empty components"));
        }
        if segments.iter().any(|s| *s == "." || *s == "..") {
            return Err(invalid(path, "must not contain '.' or '..' components"));
        }

        let mut tail = segments.iter().rev().copied();

        let file_name = tail.next().unwrap_or_default();
        if !PROFILE_FILE_REGEX.is_match(file_name) {
            return Err(invalid(path, "file name must match [a-z0-9]+.ovpn"));
        }
        if tail.next() != Some(PROFILES_DIR) || tail.next() != Some(self.app_dir.as_str()) {
            return Err(invalid(
                path,
                &format!("must be inside {}/{}/", self.app_dir, PROFILES_DIR),
            ));
        }

        Ok(())
    }

    pub fn is_valid_str(&self, text: &str) -> bool {
        self.validate_str(text).is_ok()
    }
}

fn invalid(path: &Path, reason: &str) -> ProfileError {
    ProfileError::InvalidProfilePath(format!("{} ({})", path.display(), reason))
}
