//! Sensor observations and the tracker's view of each sensor.
//!
//! A [`SensorUpdate`] is what a producer emits. A [`SensorState`] is what the
//! registry keeps: the latest observed fields plus the registration metadata
//! learned from the sink.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of a sensor observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SensorValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorValue::Bool(v) => write!(f, "{v}"),
            SensorValue::Int(v) => write!(f, "{v}"),
            SensorValue::Float(v) => write!(f, "{v}"),
            SensorValue::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for SensorValue {
    fn from(v: bool) -> Self {
        SensorValue::Bool(v)
    }
}

impl From<i64> for SensorValue {
    fn from(v: i64) -> Self {
        SensorValue::Int(v)
    }
}

impl From<f64> for SensorValue {
    fn from(v: f64) -> Self {
        SensorValue::Float(v)
    }
}

impl From<&str> for SensorValue {
    fn from(v: &str) -> Self {
        SensorValue::Text(v.to_string())
    }
}

impl From<String> for SensorValue {
    fn from(v: String) -> Self {
        SensorValue::Text(v)
    }
}

/// Entity platform the sink files the sensor under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    #[default]
    Sensor,
    BinarySensor,
}

impl SensorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Sensor => "sensor",
            SensorType::BinarySensor => "binary_sensor",
        }
    }
}

/// Device class hint used by the sink to pick units and icons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Battery,
    DataRate,
    DataSize,
    Duration,
    Energy,
    Frequency,
    Power,
    SignalStrength,
    Temperature,
    Timestamp,
    Voltage,
}

/// How the sink should aggregate the sensor's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
    Total,
    TotalIncreasing,
}

/// Entity category for sensors that are not primary readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Config,
    Diagnostic,
}

/// A single observation emitted by a producer.
///
/// Consumed exactly once by the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorUpdate {
    /// Unique sensor identifier, stable across emissions
    pub id: String,
    /// Display name
    pub name: String,
    /// Icon, e.g. `mdi:battery`
    pub icon: Option<String>,
    /// Observed value
    pub value: SensorValue,
    /// Free-form attributes
    pub attributes: Option<serde_json::Value>,
    pub sensor_type: SensorType,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub category: Option<EntityCategory>,
    /// Unit of measurement
    pub units: Option<String>,
}

impl SensorUpdate {
    /// Create an update with just the required fields.
    pub fn new(id: impl Into<String>, name: impl Into<String>, value: impl Into<SensorValue>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: None,
            value: value.into(),
            attributes: None,
            sensor_type: SensorType::Sensor,
            device_class: None,
            state_class: None,
            category: None,
            units: None,
        }
    }

    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn attributes(mut self, attributes: serde_json::Value) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn sensor_type(mut self, sensor_type: SensorType) -> Self {
        self.sensor_type = sensor_type;
        self
    }

    pub fn device_class(mut self, class: DeviceClass) -> Self {
        self.device_class = Some(class);
        self
    }

    pub fn state_class(mut self, class: StateClass) -> Self {
        self.state_class = Some(class);
        self
    }

    pub fn category(mut self, category: EntityCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// Registration metadata the sink has reported for a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SensorMetadata {
    /// Set once a registration succeeds; never cleared
    pub registered: bool,
    /// Mirrors the sink's latest `is_disabled` report
    pub disabled: bool,
}

/// The registry's durable view of a sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorState {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub value: SensorValue,
    pub attributes: Option<serde_json::Value>,
    pub sensor_type: SensorType,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub category: Option<EntityCategory>,
    pub units: Option<String>,
    pub metadata: SensorMetadata,
}

impl SensorState {
    /// Build a fresh, unregistered state from a first-seen update.
    pub fn from_update(update: SensorUpdate) -> Self {
        Self {
            id: update.id,
            name: update.name,
            icon: update.icon,
            value: update.value,
            attributes: update.attributes,
            sensor_type: update.sensor_type,
            device_class: update.device_class,
            state_class: update.state_class,
            category: update.category,
            units: update.units,
            metadata: SensorMetadata::default(),
        }
    }

    /// Overwrite every observed field with the update's, leaving metadata alone.
    ///
    /// The id is not touched; callers only merge updates keyed by the same id.
    pub fn merge(&mut self, update: SensorUpdate) {
        self.name = update.name;
        self.icon = update.icon;
        self.value = update.value;
        self.attributes = update.attributes;
        self.sensor_type = update.sensor_type;
        self.device_class = update.device_class;
        self.state_class = update.state_class;
        self.category = update.category;
        self.units = update.units;
    }

    pub fn is_registered(&self) -> bool {
        self.metadata.registered
    }

    pub fn is_disabled(&self) -> bool {
        self.metadata.disabled
    }
}
