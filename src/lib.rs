//! Home Assistant sensor agent.
//!
//! Collects readings from local sensor producers and reports them to a
//! Home Assistant style webhook sink. New sensors are registered on first
//! sight, known sensors get state updates, and the sink's answers feed back
//! into each sensor's registration metadata.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Hass Sensor Agent                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐    ┌───────────┐    ┌────────────┐    ┌────────┐  │
//! │  │ Producers │───▶│  Tracker  │───▶│   Codec    │───▶│  HTTP  │──┼─▶ sink
//! │  │ (sysinfo) │    │ (per-id   │    │ (envelope, │    │ client │  │
//! │  └───────────┘    │  queues)  │    │  AES-GCM)  │    └────────┘  │
//! │                   └─────┬─────┘    └────────────┘        │       │
//! │                         ▼                                ▼       │
//! │                   ┌───────────┐                   ┌───────────┐  │
//! │                   │ Registry  │◀──────────────────│ Response  │  │
//! │                   │ (state +  │    metadata       │  decoder  │  │
//! │                   │ metadata) │                   └───────────┘  │
//! │                   └───────────┘                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Before any reporting the device must be registered once with
//! [`api::Registration`], which stores the webhook credentials in a
//! [`PreferenceStore`].
//!
//! # Example
//!
//! ```no_run
//! use hass_sensor_agent::{
//!     api, sensor::MetadataStore, shutdown, ReportStats, SensorTracker, SensorUpdate,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let client = api::ApiClient::new(Duration::from_secs(30))?;
//! let config = api::ApiConfig::new("http://localhost:8123/api/webhook/abc", None);
//! let (_trigger, signal) = shutdown::channel();
//! let tracker = SensorTracker::new(
//!     client,
//!     config,
//!     Arc::new(ReportStats::new()),
//!     Some(MetadataStore::new("/tmp/sensor_metadata.json")),
//!     signal,
//!     tracing::info_span!("tracker"),
//! );
//!
//! tracker.handle(SensorUpdate::new("battery_level", "Battery Level", 87i64).units("%"));
//! tracker.drain().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod preferences;
pub mod producers;
pub mod sensor;
pub mod shutdown;
pub mod stats;
pub mod tracker;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, ProducerConfig};
pub use preferences::{FilePreferences, MemoryPreferences, PreferenceStore};
pub use producers::{build_producers, spawn_producer, SensorProducer};
pub use sensor::{
    MetadataStore, SensorMetadata, SensorRegistry, SensorState, SensorUpdate, SensorValue,
};
pub use stats::{ReportStats, SharedReportStats, StatsSnapshot};
pub use tracker::{ReportError, ReportOutcome, Reporter, SensorTracker};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name reported to the sink at registration.
pub const APP_NAME: &str = "hass-sensor-agent";
