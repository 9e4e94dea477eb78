//! Configuration handling for the privileged helper
//!
//! The configuration is read from a single root-owned file. There is no way
//! for the caller to point the helper at a different file: whoever controls
//! the config controls which executable runs as root.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Fixed location of the system configuration file
pub const SYSTEM_CONFIG_PATH: &str = "/etc/vpn-pk/config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
    #[error("Refusing config file {0}: must be owned by root and not writable by group or others")]
    InsecureConfig(PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    pub client: ClientConfig,
    pub profiles: ProfilesConfig,
    pub autostart: AutostartConfig,
    pub stop: StopConfig,
}

/// The VPN client executable and any arguments placed before `--config`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub executable: PathBuf,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesConfig {
    /// Directory name that must directly contain `profiles/<id>.ovpn`
    pub app_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutostartConfig {
    pub marker_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopConfig {
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("/usr/sbin/openvpn"),
            args: Vec::new(),
        }
    }
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            app_dir: "pritunl_client".to_string(),
        }
    }
}

impl Default for AutostartConfig {
    fn default() -> Self {
        Self {
            marker_dir: PathBuf::from("/etc/pritunl_client"),
        }
    }
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            timeout_ms: 5000,
        }
    }
}

impl StopConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl HelperConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: HelperConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the system config, falling back to defaults when it is absent
    #[cfg(unix)]
    pub fn load_system() -> Result<Self, ConfigError> {
        use std::os::unix::fs::MetadataExt;

        let path = Path::new(SYSTEM_CONFIG_PATH);
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.uid() != 0 || metadata.mode() & 0o022 != 0 {
            return Err(ConfigError::InsecureConfig(path.to_path_buf()));
        }

        Self::load(path)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.client.executable.is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "client.executable must be an absolute path, got {}",
                self.client.executable.display()
            )));
        }

        let app_dir = &self.profiles.app_dir;
        if app_dir.is_empty() || app_dir == "." || app_dir == ".." || app_dir.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "profiles.app_dir must be a single directory name, got {:?}",
                app_dir
            )));
        }

        if !self.autostart.marker_dir.is_absolute() {
            return Err(ConfigError::Invalid(format!(
                "autostart.marker_dir must be an absolute path, got {}",
                self.autostart.marker_dir.display()
            )));
        }

        if self.stop.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "stop.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.stop.timeout_ms < self.stop.poll_interval_ms {
            return Err(ConfigError::Invalid(
                "stop.timeout_ms must be at least stop.poll_interval_ms".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = HelperConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.client.executable, PathBuf::from("/usr/sbin/openvpn"));
        assert_eq!(config.profiles.app_dir, "pritunl_client");
        assert_eq!(config.autostart.marker_dir, PathBuf::from("/etc/pritunl_client"));
        assert_eq!(config.stop.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.stop.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[client]\nexecutable = \"/opt/openvpn/sbin/openvpn\"\n\n[stop]\ntimeout_ms = 2000\n",
        )
        .unwrap();

        let config = HelperConfig::load(&path).unwrap();
        assert_eq!(
            config.client.executable,
            PathBuf::from("/opt/openvpn/sbin/openvpn")
        );
        assert_eq!(config.stop.timeout_ms, 2000);
        assert_eq!(config.stop.poll_interval_ms, 100);
        assert_eq!(config.profiles.app_dir, "pritunl_client");
    }

    #[test]
    fn test_load_rejects_relative_executable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[client]\nexecutable = \"openvpn\"\n").unwrap();

        let result = HelperConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_rejects_malformed_toml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[client\nexecutable = 3").unwrap();

        let result = HelperConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validate_app_dir() {
        for bad in ["", ".", "..", "a/b"] {
            let mut config = HelperConfig::default();
            config.profiles.app_dir = bad.to_string();
            assert!(config.validate().is_err(), "accepted app_dir {:?}", bad);
        }
    }

    #[test]
    fn test_validate_stop_timing() {
        let mut config = HelperConfig::default();
        config.stop.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = HelperConfig::default();
        config.stop.timeout_ms = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_preserves_values() {
        let mut config = HelperConfig::default();
        config.client.args = vec!["--verb".to_string(), "3".to_string()];

        let text = config.to_toml().unwrap();
        let parsed: HelperConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
