//! Reporting statistics.
//!
//! Counts what the agent has sent to the sink and how it went, so an
//! operator can audit reporting without reading the logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for the current session.
#[derive(Debug)]
pub struct ReportStats {
    /// Updates received from producers
    updates_received: AtomicU64,
    /// `register_sensor` requests sent
    registrations_sent: AtomicU64,
    /// Sensors the sink confirmed as registered
    registrations_confirmed: AtomicU64,
    /// `update_sensor_states` requests sent
    updates_sent: AtomicU64,
    /// Reports dropped on transport or encoding errors
    reports_failed: AtomicU64,
    /// Responses that could not be understood or were empty
    responses_malformed: AtomicU64,
    /// Sensors the sink reported as disabled
    sensors_disabled: AtomicU64,
    session_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl ReportStats {
    pub fn new() -> Self {
        Self {
            updates_received: AtomicU64::new(0),
            registrations_sent: AtomicU64::new(0),
            registrations_confirmed: AtomicU64::new(0),
            updates_sent: AtomicU64::new(0),
            reports_failed: AtomicU64::new(0),
            responses_malformed: AtomicU64::new(0),
            sensors_disabled: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create statistics that continue from, and save back to, `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("Could not load previous report statistics: {e}");
        }

        stats
    }

    pub fn record_update_received(&self) {
        self.updates_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_registration_sent(&self) {
        self.registrations_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_registration_confirmed(&self) {
        self.registrations_confirmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_update_sent(&self) {
        self.updates_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_report_failed(&self) {
        self.reports_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_response_malformed(&self) {
        self.responses_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sensor_disabled(&self) {
        self.sensors_disabled.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            updates_received: self.updates_received.load(Ordering::Relaxed),
            registrations_sent: self.registrations_sent.load(Ordering::Relaxed),
            registrations_confirmed: self.registrations_confirmed.load(Ordering::Relaxed),
            updates_sent: self.updates_sent.load(Ordering::Relaxed),
            reports_failed: self.reports_failed.load(Ordering::Relaxed),
            responses_malformed: self.responses_malformed.load(Ordering::Relaxed),
            sensors_disabled: self.sensors_disabled.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Reporting Statistics:\n\
             - Updates received: {}\n\
             - Registrations sent: {} (confirmed: {})\n\
             - Updates sent: {}\n\
             - Reports failed: {}\n\
             - Empty or malformed responses: {}\n\
             - Sensors disabled by the sink: {}\n\
             - Session duration: {} seconds",
            stats.updates_received,
            stats.registrations_sent,
            stats.registrations_confirmed,
            stats.updates_sent,
            stats.reports_failed,
            stats.responses_malformed,
            stats.sensors_disabled,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.snapshot();
            let persisted = PersistedStats {
                updates_received: stats.updates_received,
                registrations_sent: stats.registrations_sent,
                registrations_confirmed: stats.registrations_confirmed,
                updates_sent: stats.updates_sent,
                reports_failed: stats.reports_failed,
                responses_malformed: stats.responses_malformed,
                sensors_disabled: stats.sensors_disabled,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.updates_received
                    .store(persisted.updates_received, Ordering::Relaxed);
                self.registrations_sent
                    .store(persisted.registrations_sent, Ordering::Relaxed);
                self.registrations_confirmed
                    .store(persisted.registrations_confirmed, Ordering::Relaxed);
                self.updates_sent
                    .store(persisted.updates_sent, Ordering::Relaxed);
                self.reports_failed
                    .store(persisted.reports_failed, Ordering::Relaxed);
                self.responses_malformed
                    .store(persisted.responses_malformed, Ordering::Relaxed);
                self.sensors_disabled
                    .store(persisted.sensors_disabled, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}

impl Default for ReportStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub updates_received: u64,
    pub registrations_sent: u64,
    pub registrations_confirmed: u64,
    pub updates_sent: u64,
    pub reports_failed: u64,
    pub responses_malformed: u64,
    pub sensors_disabled: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    updates_received: u64,
    registrations_sent: u64,
    registrations_confirmed: u64,
    updates_sent: u64,
    reports_failed: u64,
    responses_malformed: u64,
    sensors_disabled: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared statistics.
pub type SharedReportStats = Arc<ReportStats>;
