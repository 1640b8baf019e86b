//! Beacon configuration management.
//!
//! Handles loading, saving, and validating halo configuration including:
//! - The advertised service/characteristic pair and display name
//! - The local identity announced to peers
//! - The four engine cadences (authorization poll, report, process, restart)
//!
//! The smoothing and classification constants are deliberately not
//! configurable; they live next to the code in [`crate::range`] and
//! [`crate::samples`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::{uuid, Uuid};

use crate::error::{HaloError, Result};

/// Service advertised by every halo node and scanned for in peers.
pub const DEFAULT_SERVICE_UUID: Uuid = uuid!("5ba4f3a2-88e1-4f6d-9c61-3f12d7aa0b43");

/// Readable characteristic under the service carrying the UTF-8 identity.
pub const DEFAULT_CHARACTERISTIC_UUID: Uuid = uuid!("e0d17c1b-2a9f-4d30-b6c8-51a02f84c9de");

/// Display name carried in the advertisement payload.
pub const DEFAULT_LOCAL_NAME: &str = "HaloBeacon";

/// Main beacon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    /// Identity announced to peers. `None` lets the caller pick a fallback.
    pub identity: Option<String>,

    /// Service UUID advertised and scanned for.
    pub service_uuid: Uuid,

    /// Characteristic UUID holding the identity payload.
    pub characteristic_uuid: Uuid,

    /// Display name included in the advertisement.
    pub local_name: String,

    /// Cadence of the radio authorization/power poll, in milliseconds.
    pub authorization_poll_ms: u64,

    /// Cadence of the peer report cycle while detecting, in milliseconds.
    pub report_interval_ms: u64,

    /// Cadence of the pending-validation poll, in milliseconds.
    pub process_interval_ms: u64,

    /// Delay before a stalled validation batch is swept and scanning
    /// restarts, in milliseconds.
    pub restart_delay_ms: u64,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            identity: None,
            service_uuid: DEFAULT_SERVICE_UUID,
            characteristic_uuid: DEFAULT_CHARACTERISTIC_UUID,
            local_name: DEFAULT_LOCAL_NAME.to_owned(),
            authorization_poll_ms: 1000,
            report_interval_ms: 1000,
            process_interval_ms: 2000,
            restart_delay_ms: 3000,
        }
    }
}

impl BeaconConfig {
    /// Load configuration from `path`, falling back to defaults if the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed, or
    /// validated.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self =
                toml::from_str(&content).map_err(|e| HaloError::ConfigParse(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| HaloError::ConfigParse(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check that every field holds a usable value.
    ///
    /// # Errors
    ///
    /// Returns [`HaloError::ConfigValidation`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<()> {
        if let Some(identity) = &self.identity {
            if identity.is_empty() {
                return Err(HaloError::ConfigValidation {
                    field: "identity",
                    message: "must not be empty when set".into(),
                });
            }
        }
        if self.local_name.is_empty() {
            return Err(HaloError::ConfigValidation {
                field: "local_name",
                message: "must not be empty".into(),
            });
        }
        if self.service_uuid == self.characteristic_uuid {
            return Err(HaloError::ConfigValidation {
                field: "characteristic_uuid",
                message: "must differ from service_uuid".into(),
            });
        }
        for (field, value) in [
            ("authorization_poll_ms", self.authorization_poll_ms),
            ("report_interval_ms", self.report_interval_ms),
            ("process_interval_ms", self.process_interval_ms),
            ("restart_delay_ms", self.restart_delay_ms),
        ] {
            if value == 0 {
                return Err(HaloError::ConfigValidation {
                    field,
                    message: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }

    /// The default configuration file path.
    ///
    /// On Linux deployments: `/etc/halo/config.toml`.
    /// Elsewhere: the platform config directory for `halo`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        #[cfg(target_os = "linux")]
        {
            PathBuf::from("/etc/halo/config.toml")
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "halo")
                .map(|dirs| dirs.config_dir().join("config.toml"))
                .unwrap_or_else(|| PathBuf::from("halo-config.toml"))
        }
    }

    /// Authorization poll cadence.
    #[must_use]
    pub const fn authorization_poll(&self) -> Duration {
        Duration::from_millis(self.authorization_poll_ms)
    }

    /// Report cadence.
    #[must_use]
    pub const fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    /// Pending-validation poll cadence.
    #[must_use]
    pub const fn process_interval(&self) -> Duration {
        Duration::from_millis(self.process_interval_ms)
    }

    /// Restart-guard delay.
    #[must_use]
    pub const fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BeaconConfig::default();
        config.validate().unwrap();
        assert_eq!(config.report_interval(), Duration::from_secs(1));
        assert_eq!(config.process_interval(), Duration::from_secs(2));
        assert_eq!(config.restart_delay(), Duration::from_secs(3));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = BeaconConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, BeaconConfig::default());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("halo").join("config.toml");

        let mut config = BeaconConfig::default();
        config.identity = Some("peer-A".into());
        config.report_interval_ms = 500;
        config.save(&path).unwrap();

        let loaded = BeaconConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn rejects_unparsable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "report_interval_ms = \"soon\"").unwrap();

        let err = BeaconConfig::load_or_default(&path).unwrap_err();
        assert!(matches!(err, HaloError::ConfigParse(_)));
    }

    #[test]
    fn rejects_zero_cadence() {
        let config = BeaconConfig {
            process_interval_ms: 0,
            ..BeaconConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, HaloError::ConfigValidation { field, .. } if field == "process_interval_ms")
        );
    }

    #[test]
    fn rejects_empty_identity_and_name() {
        let config = BeaconConfig {
            identity: Some(String::new()),
            ..BeaconConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BeaconConfig {
            local_name: String::new(),
            ..BeaconConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_colliding_uuids() {
        let config = BeaconConfig {
            characteristic_uuid: DEFAULT_SERVICE_UUID,
            ..BeaconConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, HaloError::ConfigValidation { field, .. } if field == "characteristic_uuid")
        );
    }
}
