//! In-memory registry of sensor states.
//!
//! The registry is the sole owner of [`SensorState`] values. Every method is
//! pure in-memory work under a single registry-wide read/write lock; nothing
//! here performs I/O.

use crate::sensor::types::{SensorMetadata, SensorState, SensorUpdate};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// `add` was called for an id that is already tracked
    DuplicateId(String),
    /// `update` was called for an id that is not tracked
    UnknownId(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicateId(id) => write!(f, "Sensor {id} is already registered"),
            RegistryError::UnknownId(id) => write!(f, "Sensor {id} is not tracked"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Which request a tracked update must trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// First time this id was seen
    Register,
    /// The id already existed and was merged
    Update,
}

/// Result of [`SensorRegistry::track`].
#[derive(Debug, Clone)]
pub struct Tracked {
    pub dispatch: Dispatch,
    /// Snapshot of the merged state, taken under the same lock
    pub state: SensorState,
}

/// Mapping of sensor id to its state.
#[derive(Debug, Default)]
pub struct SensorRegistry {
    sensors: RwLock<HashMap<String, SensorState>>,
    /// Metadata remembered from earlier runs, applied when an id is first seen
    known: HashMap<String, SensorMetadata>,
}

impl SensorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that restores `known` metadata for ids it sees again.
    pub fn with_known_metadata(known: HashMap<String, SensorMetadata>) -> Self {
        Self {
            sensors: RwLock::default(),
            known,
        }
    }

    fn first_seen(&self, update: SensorUpdate) -> SensorState {
        let mut state = SensorState::from_update(update);
        if let Some(metadata) = self.known.get(&state.id) {
            state.metadata = *metadata;
        }
        state
    }

    /// Start tracking a new sensor.
    ///
    /// It starts unregistered and enabled unless metadata for the id is known.
    pub fn add(&self, update: SensorUpdate) -> Result<(), RegistryError> {
        let mut sensors = self.sensors.write();
        if sensors.contains_key(&update.id) {
            tracing::error!(sensor = %update.id, "Refusing to add duplicate sensor");
            return Err(RegistryError::DuplicateId(update.id));
        }
        let state = self.first_seen(update);
        sensors.insert(state.id.clone(), state);
        Ok(())
    }

    /// Merge an update into an existing sensor.
    ///
    /// Unknown ids are never created here; the update is dropped with a warning.
    pub fn update(&self, update: SensorUpdate) -> Result<(), RegistryError> {
        let mut sensors = self.sensors.write();
        match sensors.get_mut(&update.id) {
            Some(state) => {
                state.merge(update);
                Ok(())
            }
            None => {
                tracing::warn!(sensor = %update.id, "Dropping update for untracked sensor");
                Err(RegistryError::UnknownId(update.id))
            }
        }
    }

    /// Add or merge an update and decide which request it triggers.
    ///
    /// The existence check, the mutation and the decision happen under one
    /// exclusive lock, so concurrent first updates for the same id yield
    /// exactly one [`Dispatch::Register`].
    pub fn track(&self, update: SensorUpdate) -> Tracked {
        let mut sensors = self.sensors.write();
        match sensors.get_mut(&update.id) {
            Some(state) => {
                state.merge(update);
                Tracked {
                    dispatch: Dispatch::Update,
                    state: state.clone(),
                }
            }
            None => {
                let state = self.first_seen(update);
                sensors.insert(state.id.clone(), state.clone());
                Tracked {
                    dispatch: Dispatch::Register,
                    state,
                }
            }
        }
    }

    /// Snapshot of a sensor's state.
    pub fn get(&self, id: &str) -> Option<SensorState> {
        self.sensors.read().get(id).cloned()
    }

    pub fn exists(&self, id: &str) -> bool {
        self.sensors.read().contains_key(id)
    }

    /// Current metadata of a sensor.
    pub fn metadata(&self, id: &str) -> Option<SensorMetadata> {
        self.sensors.read().get(id).map(|s| s.metadata)
    }

    /// Mutate a sensor's metadata in place.
    ///
    /// This is the only path by which response handling touches a tracked
    /// sensor. Returns `None` if the id is not tracked.
    pub fn with_metadata<R>(&self, id: &str, f: impl FnOnce(&mut SensorMetadata) -> R) -> Option<R> {
        let mut sensors = self.sensors.write();
        sensors.get_mut(id).map(|s| f(&mut s.metadata))
    }

    /// Metadata of every sensor, including remembered ones not seen this run.
    pub fn metadata_map(&self) -> HashMap<String, SensorMetadata> {
        let mut all = self.known.clone();
        all.extend(
            self.sensors
                .read()
                .iter()
                .map(|(id, state)| (id.clone(), state.metadata)),
        );
        all
    }

    /// Ids of all tracked sensors, in no particular order.
    pub fn list(&self) -> Vec<String> {
        self.sensors.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sensors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.read().is_empty()
    }
}
