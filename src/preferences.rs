//! Persisted key/value preferences.
//!
//! Holds the registration credentials and device identity. The store is
//! written by the registration flow and read once at agent startup.

use crate::config::ConfigError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Well-known preference keys.
pub mod keys {
    pub const HOST: &str = "host";
    pub const USE_TLS: &str = "use_tls";
    pub const TOKEN: &str = "token";
    pub const WEBHOOK_ID: &str = "webhook_id";
    pub const SECRET: &str = "secret";
    pub const CLOUDHOOK_URL: &str = "cloudhook_url";
    pub const REMOTE_UI_URL: &str = "remote_ui_url";
    pub const DEVICE_ID: &str = "device_id";
    pub const DEVICE_NAME: &str = "device_name";
    pub const VERSION: &str = "version";
    pub const REGISTERED: &str = "registered";
}

/// Key/value preference storage.
pub trait PreferenceStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError>;

    /// Path of an auxiliary file (logs, stats) next to the preferences.
    fn storage_path(&self, file: &str) -> Result<PathBuf, ConfigError>;

    /// Whether a device registration has been completed.
    fn is_registered(&self) -> bool {
        matches!(self.get(keys::REGISTERED), Ok(Some(v)) if v == "true")
    }
}

/// Preferences persisted as a JSON object on disk.
///
/// Every `set` rewrites the file.
#[derive(Debug)]
pub struct FilePreferences {
    dir: PathBuf,
    values: BTreeMap<String, String>,
}

impl FilePreferences {
    const FILE_NAME: &'static str = "preferences.json";

    /// Open (or start) the preferences stored in `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let dir = dir.into();
        let path = dir.join(Self::FILE_NAME);

        let values = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?
        } else {
            BTreeMap::new()
        };

        Ok(Self { dir, values })
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(Self::FILE_NAME)
    }

    fn save(&self) -> Result<(), ConfigError> {
        ensure_dir(&self.dir)?;
        let content = serde_json::to_string_pretty(&self.values)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(self.path(), content).map_err(|e| ConfigError::IoError(e.to_string()))
    }
}

impl PreferenceStore for FilePreferences {
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.values.insert(key.to_string(), value.to_string());
        self.save()
    }

    fn storage_path(&self, file: &str) -> Result<PathBuf, ConfigError> {
        ensure_dir(&self.dir)?;
        Ok(self.dir.join(file))
    }
}

/// Non-persistent preferences.
#[derive(Debug, Default, Clone)]
pub struct MemoryPreferences {
    values: BTreeMap<String, String>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn storage_path(&self, file: &str) -> Result<PathBuf, ConfigError> {
        Ok(std::env::temp_dir().join(file))
    }
}

fn ensure_dir(dir: &Path) -> Result<(), ConfigError> {
    std::fs::create_dir_all(dir).map_err(|e| ConfigError::IoError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_preferences() {
        let mut prefs = MemoryPreferences::new();
        assert_eq!(prefs.get(keys::TOKEN).unwrap(), None);
        assert!(!prefs.is_registered());

        prefs.set(keys::TOKEN, "abc").unwrap();
        prefs.set(keys::REGISTERED, "true").unwrap();
        assert_eq!(prefs.get(keys::TOKEN).unwrap().as_deref(), Some("abc"));
        assert!(prefs.is_registered());
    }

    #[test]
    fn test_file_preferences_persist() {
        let dir = tempfile::tempdir().unwrap();

        let mut prefs = FilePreferences::open(dir.path()).unwrap();
        prefs.set(keys::WEBHOOK_ID, "abc123").unwrap();
        prefs.set(keys::HOST, "localhost:8123").unwrap();
        assert!(prefs.path().exists());

        let reopened = FilePreferences::open(dir.path()).unwrap();
        assert_eq!(
            reopened.get(keys::WEBHOOK_ID).unwrap().as_deref(),
            Some("abc123")
        );
        assert_eq!(
            reopened.storage_path("agent.log").unwrap(),
            dir.path().join("agent.log")
        );
    }

    #[test]
    fn test_file_preferences_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("preferences.json"), "not json").unwrap();
        assert!(matches!(
            FilePreferences::open(dir.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
