//! Sensor data model and registry.
//!
//! Producers emit [`SensorUpdate`]s; the [`SensorRegistry`] folds them into
//! one [`SensorState`] per sensor id. [`MetadataStore`] keeps registration
//! metadata across restarts.

pub mod registry;
pub mod store;
pub mod types;

pub use registry::{Dispatch, RegistryError, SensorRegistry, Tracked};
pub use store::MetadataStore;
pub use types::{
    DeviceClass, EntityCategory, SensorMetadata, SensorState, SensorType, SensorUpdate,
    SensorValue, StateClass,
};
