//! Sensor metadata that survives restarts.
//!
//! The file holds one `{"registered": .., "disabled": ..}` object per sensor
//! id, so a sensor the sink already knows is not registered again.

use crate::config::ConfigError;
use crate::sensor::types::SensorMetadata;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// JSON file of per-sensor metadata.
#[derive(Debug)]
pub struct MetadataStore {
    path: PathBuf,
    // Serializes writers so an older snapshot never lands after a newer one.
    write: Mutex<()>,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored metadata. A missing file is an empty map.
    pub fn load(&self) -> Result<HashMap<String, SensorMetadata>, ConfigError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Replace the file with `metadata`.
    pub fn persist(&self, metadata: &HashMap<String, SensorMetadata>) -> Result<(), ConfigError> {
        let ordered: BTreeMap<_, _> = metadata.iter().collect();
        let content = serde_json::to_string_pretty(&ordered)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        let _guard = self.write.lock();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        std::fs::write(&self.path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }
}
