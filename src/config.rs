//! Configuration for the sensor agent.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Directory name used under the platform config and data directories.
pub const APP_DIR: &str = "hass-sensor-agent";

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Deadline for a single HTTP call
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,

    /// Interval between producer samples
    #[serde(with = "duration_serde")]
    pub update_interval: Duration,

    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,

    /// Which built-in producers to run
    pub producers: ProducerConfig,

    /// Path for preferences, logs and report statistics
    pub data_path: PathBuf,

    /// Always encrypt requests, even if registration issued no secret
    pub require_encryption: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        Self {
            request_timeout: Duration::from_secs(30),
            update_interval: Duration::from_secs(60),
            log_level: "info".to_string(),
            producers: ProducerConfig::default(),
            data_path: data_dir,
            require_encryption: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is missing.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }
}

/// Which built-in producers to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerConfig {
    pub memory: bool,
    pub load: bool,
    pub uptime: bool,
    #[serde(default)]
    pub users: bool,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            memory: true,
            load: true,
            uptime: true,
            users: true,
        }
    }
}

impl ProducerConfig {
    /// Parse producer selection from a comma-separated string.
    pub fn from_csv(s: &str) -> Self {
        let names: Vec<String> = s.split(',').map(|s| s.trim().to_lowercase()).collect();
        let enabled = |name: &str| names.iter().any(|s| s == name || s == "all");

        Self {
            memory: enabled("memory"),
            load: enabled("load"),
            uptime: enabled("uptime"),
            users: enabled("users"),
        }
    }

    /// Check if at least one producer is enabled.
    pub fn any_enabled(&self) -> bool {
        self.memory || self.load || self.uptime || self.users
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_config_parsing() {
        let config = ProducerConfig::from_csv("memory, load");
        assert!(config.memory);
        assert!(config.load);
        assert!(!config.uptime);
        assert!(!config.users);

        let config = ProducerConfig::from_csv("all");
        assert!(config.memory && config.load && config.uptime && config.users);

        let config = ProducerConfig::from_csv("users");
        assert!(config.users && config.any_enabled());
        assert!(!config.memory);

        let config = ProducerConfig::from_csv("battery");
        assert!(!config.any_enabled());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.update_interval, Duration::from_secs(60));
        assert_eq!(config.log_level, "info");
        assert!(!config.require_encryption);
        assert!(config.data_path.ends_with(APP_DIR));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.request_timeout = Duration::from_secs(5);
        config.require_encryption = true;
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.request_timeout, Duration::from_secs(5));
        assert!(loaded.require_encryption);

        // Files written before the users producer existed leave it off.
        let mut older = serde_json::to_value(Config::default()).unwrap();
        older["producers"]
            .as_object_mut()
            .unwrap()
            .remove("users");
        std::fs::write(&path, older.to_string()).unwrap();
        let older = Config::load_from(&path).unwrap();
        assert!(older.producers.memory);
        assert!(!older.producers.users);

        let missing = Config::load_from(&dir.path().join("missing.json")).unwrap();
        assert_eq!(missing.request_timeout, Duration::from_secs(30));
    }
}
