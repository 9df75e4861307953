//! Configuration management for ridguard.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.
//!
//! Application configuration covers where things live and how the session
//! runs. User-facing alert options (radius, cooldown, ignore lists) are kept
//! in the preference store instead; see [`crate::settings`].

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::audit::DEFAULT_PREFIX;
use crate::error::{Error, Result};
use crate::source::SourceKind;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "ridguard";

/// Default preference database file name.
const PREFERENCES_FILE_NAME: &str = "preferences.db";

/// Default audit log directory name.
const LOG_DIR_NAME: &str = "logs";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `RIDGUARD_`, sections separated
///    by `__`, e.g. `RIDGUARD_SCAN__TICK_INTERVAL_MS`)
/// 2. TOML config file at `~/.config/ridguard/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Scanning session configuration.
    pub scan: ScanConfig,
    /// Alert action configuration.
    pub alert: AlertConfig,
    /// Detection source configuration.
    pub sources: SourcesConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the preference database.
    /// Defaults to `~/.local/share/ridguard/preferences.db`
    pub preferences_path: Option<PathBuf>,
    /// Directory for audit log files.
    /// Defaults to `~/.local/share/ridguard/logs`
    pub log_dir: Option<PathBuf>,
    /// Audit file name prefix.
    pub log_prefix: String,
}

/// Scanning session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Display refresh period in milliseconds.
    pub tick_interval_ms: u64,
    /// Delay between replayed reports in milliseconds.
    pub replay_pace_ms: u64,
    /// Capacity of the source event queue.
    pub queue_capacity: usize,
    /// Radius of the radar disc in display units.
    pub radar_disc_radius: f64,
}

/// Durations used by the silence and ignore actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Minutes the silence action suppresses all alerts.
    pub silence_minutes: i64,
    /// Minutes a temporary ignore lasts.
    pub temp_ignore_minutes: i64,
}

/// Replay files per detection technology.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Bluetooth reports.
    pub bluetooth_replay: Option<PathBuf>,
    /// Wi-Fi beacon reports.
    pub wifi_beacon_replay: Option<PathBuf>,
    /// Wi-Fi NAN reports.
    pub wifi_nan_replay: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            preferences_path: None, // Resolved at runtime
            log_dir: None,
            log_prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            replay_pace_ms: 500,
            queue_capacity: 256,
            radar_disc_radius: 100.0,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            silence_minutes: 30,
            temp_ignore_minutes: 60,
        }
    }
}

impl SourcesConfig {
    /// Configured replay files in summary order.
    #[must_use]
    pub fn replay_files(&self) -> Vec<(SourceKind, PathBuf)> {
        [
            (SourceKind::Bluetooth, &self.bluetooth_replay),
            (SourceKind::WifiBeacon, &self.wifi_beacon_replay),
            (SourceKind::WifiNan, &self.wifi_nan_replay),
        ]
        .into_iter()
        .filter_map(|(kind, path)| path.clone().map(|p| (kind, p)))
        .collect()
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation
    /// fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("RIDGUARD_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| -> Result<()> {
            Err(Error::ConfigValidation {
                message: message.to_string(),
            })
        };

        if self.scan.tick_interval_ms == 0 {
            return invalid("tick_interval_ms must be greater than 0");
        }
        if self.scan.queue_capacity == 0 {
            return invalid("queue_capacity must be greater than 0");
        }
        let radius = self.scan.radar_disc_radius;
        if !radius.is_finite() || radius <= 0.0 {
            return invalid("radar_disc_radius must be positive");
        }

        let prefix = self.storage.log_prefix.trim();
        if prefix.is_empty() {
            return invalid("log_prefix must not be empty");
        }
        if prefix.contains(['/', '\\']) {
            return Err(Error::ConfigValidation {
                message: format!("log_prefix must be a plain file name: {prefix}"),
            });
        }

        if self.alert.silence_minutes <= 0 {
            return invalid("silence_minutes must be greater than 0");
        }
        if self.alert.temp_ignore_minutes <= 0 {
            return invalid("temp_ignore_minutes must be greater than 0");
        }

        Ok(())
    }

    /// Get the preference database path, resolving defaults if not set.
    #[must_use]
    pub fn preferences_path(&self) -> PathBuf {
        self.storage
            .preferences_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(PREFERENCES_FILE_NAME))
    }

    /// Get the audit log directory, resolving defaults if not set.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.storage
            .log_dir
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(LOG_DIR_NAME))
    }

    /// Get the display tick as a Duration.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.scan.tick_interval_ms)
    }

    /// Get the replay pace as a Duration.
    #[must_use]
    pub fn replay_pace(&self) -> Duration {
        Duration::from_millis(self.scan.replay_pace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.storage.log_prefix, "ridguard");
        assert_eq!(config.scan.tick_interval_ms, 1000);
        assert_eq!(config.scan.queue_capacity, 256);
        assert_eq!(config.alert.silence_minutes, 30);
        assert_eq!(config.alert.temp_ignore_minutes, 60);
        assert!(config.sources.replay_files().is_empty());
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_tick_interval() {
        let mut config = Config::default();
        config.scan.tick_interval_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("tick_interval_ms"));
    }

    #[test]
    fn test_validate_zero_queue_capacity() {
        let mut config = Config::default();
        config.scan.queue_capacity = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("queue_capacity"));
    }

    #[test]
    fn test_validate_prefix() {
        let mut config = Config::default();
        config.storage.log_prefix = "  ".to_string();
        assert!(config.validate().unwrap_err().to_string().contains("log_prefix"));

        config.storage.log_prefix = "../escape".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_alert_durations() {
        let mut config = Config::default();
        config.alert.silence_minutes = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.alert.temp_ignore_minutes = -5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_disc_radius() {
        let mut config = Config::default();
        config.scan.radar_disc_radius = 0.0;
        assert!(config.validate().is_err());
        config.scan.radar_disc_radius = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_paths_default() {
        let config = Config::default();
        assert!(config
            .preferences_path()
            .to_string_lossy()
            .contains("preferences.db"));
        assert!(config.log_dir().ends_with("logs"));
    }

    #[test]
    fn test_paths_custom() {
        let mut config = Config::default();
        config.storage.preferences_path = Some(PathBuf::from("/custom/prefs.db"));
        config.storage.log_dir = Some(PathBuf::from("/custom/logs"));

        assert_eq!(config.preferences_path(), PathBuf::from("/custom/prefs.db"));
        assert_eq!(config.log_dir(), PathBuf::from("/custom/logs"));
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert_eq!(config.replay_pace(), Duration::from_millis(500));
    }

    #[test]
    fn test_replay_files_order() {
        let mut config = Config::default();
        config.sources.wifi_nan_replay = Some(PathBuf::from("nan.jsonl"));
        config.sources.bluetooth_replay = Some(PathBuf::from("ble.jsonl"));

        let kinds: Vec<SourceKind> = config
            .sources
            .replay_files()
            .into_iter()
            .map(|(kind, _)| kind)
            .collect();
        assert_eq!(kinds, vec![SourceKind::Bluetooth, SourceKind::WifiNan]);
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("ridguard"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml"))).unwrap();
        assert_eq!(config.scan, ScanConfig::default());
        assert_eq!(config.alert, AlertConfig::default());
    }

    #[test]
    fn test_load_toml_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[scan]\ntick_interval_ms = 250\n\n[storage]\nlog_prefix = \"guard\"\n\n[sources]\nwifi_beacon_replay = \"beacon.jsonl\""
        )
        .unwrap();

        let config = Config::load_from(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.scan.tick_interval_ms, 250);
        assert_eq!(config.scan.queue_capacity, 256);
        assert_eq!(config.storage.log_prefix, "guard");
        assert_eq!(
            config.sources.replay_files(),
            vec![(SourceKind::WifiBeacon, PathBuf::from("beacon.jsonl"))]
        );
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scan]\nqueue_capacity = 0").unwrap();

        let err = Config::load_from(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));
    }

    #[test]
    fn test_load_rejects_wrong_types() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[scan]\ntick_interval_ms = \"fast\"").unwrap();

        let err = Config::load_from(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, Error::ConfigLoad(_)));
    }

    #[test]
    fn test_config_serialize() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(json.contains("tick_interval_ms"));
        assert!(json.contains("silence_minutes"));
    }
}
