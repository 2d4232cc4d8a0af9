//! Sensor tracker: producers in, reports out.
//!
//! ```text
//!  producer ─▶ consume loop ─┐
//!  producer ─▶ consume loop ─┼─▶ registry.track ─▶ per-sensor reporter ─▶ sink
//!  producer ─▶ consume loop ─┘                      (one task per id)
//! ```
//!
//! Each producer gets its own consumption loop so a slow producer never holds
//! up another. Every sensor id gets one reporter task fed by an unbounded
//! queue. Reports for one id go out one at a time and in emission order,
//! while different ids report concurrently. When updates pile up behind a
//! slow request only the newest queued state is sent. Producers never wait
//! on the network.

use crate::api::{
    decode_response, marshal, ApiClient, ApiConfig, CodecError, MetadataChange, Request,
    RequestType, SensorRequest, TransportError,
};
use crate::sensor::{
    Dispatch, MetadataStore, SensorRegistry, SensorState, SensorUpdate, Tracked,
};
use crate::shutdown::Shutdown;
use crate::stats::SharedReportStats;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Why a report was not delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    Codec(CodecError),
    Transport(TransportError),
}

impl std::fmt::Display for ReportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportError::Codec(e) => write!(f, "{e}"),
            ReportError::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ReportError {}

/// Result of one report round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The sink accepted the report
    Accepted(MetadataChange),
    /// The sink answered but reported a failure
    Rejected(MetadataChange),
    /// Empty or `{}` response; metadata left as is
    Unknown,
    /// The report was dropped
    Failed(ReportError),
}

/// Sends one sensor state to the sink and folds the answer back into the
/// registry.
#[derive(Debug, Clone)]
pub struct Reporter {
    registry: Arc<SensorRegistry>,
    client: ApiClient,
    api: Arc<ApiConfig>,
    stats: SharedReportStats,
    store: Option<Arc<MetadataStore>>,
}

impl Reporter {
    pub fn new(
        registry: Arc<SensorRegistry>,
        client: ApiClient,
        api: ApiConfig,
        stats: SharedReportStats,
    ) -> Self {
        Self {
            registry,
            client,
            api: Arc::new(api),
            stats,
            store: None,
        }
    }

    /// Write metadata changes to `store` as they happen.
    pub fn with_store(mut self, store: Arc<MetadataStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn persist_metadata(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = store.persist(&self.registry.metadata_map()) {
            tracing::warn!("Could not save sensor metadata to {}: {e}", store.path().display());
        }
    }

    /// Marshal, send, decode and apply a single report.
    ///
    /// The request type is chosen from the sensor's metadata as it is now,
    /// not as it was when the update was merged.
    pub async fn report(&self, mut state: SensorState) -> ReportOutcome {
        if let Some(metadata) = self.registry.metadata(&state.id) {
            state.metadata = metadata;
        }
        let id = state.id.as_str();

        let request = SensorRequest::new(&state, self.api.encrypt);
        let request_type = request.request_type();
        let body = match marshal(&request, self.api.secret.as_deref()) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(sensor = %id, "Not sending {request_type} request: {e}");
                self.stats.record_report_failed();
                return ReportOutcome::Failed(ReportError::Codec(e));
            }
        };

        match request_type {
            RequestType::RegisterSensor => self.stats.record_registration_sent(),
            _ => self.stats.record_update_sent(),
        }

        let raw = match self.client.execute(&self.api.api_url, body).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(sensor = %id, "Dropping {request_type} report: {e}");
                self.stats.record_report_failed();
                return ReportOutcome::Failed(ReportError::Transport(e));
            }
        };

        let response = match decode_response(&raw, id) {
            Ok(Some(response)) => response,
            Ok(None) => {
                tracing::debug!(sensor = %id, "No response for {request_type} request, likely a problem with the request data");
                self.stats.record_response_malformed();
                return ReportOutcome::Unknown;
            }
            Err(e) => {
                tracing::warn!(sensor = %id, "Could not read {request_type} response: {e}");
                self.stats.record_response_malformed();
                return ReportOutcome::Failed(ReportError::Codec(e));
            }
        };

        if let Some(error) = response.sensor.as_ref().and_then(|s| s.error.as_ref()) {
            tracing::warn!(sensor = %id, "Sink could not update sensor: {error}");
        }

        let change = self
            .registry
            .with_metadata(id, |metadata| response.apply(metadata))
            .unwrap_or_default();
        if !change.is_empty() {
            self.persist_metadata();
        }

        if change.registered {
            tracing::info!(sensor = %id, name = %state.name, "Sensor registered");
            self.stats.record_registration_confirmed();
        }
        match change.disabled {
            Some(true) => {
                tracing::info!(sensor = %id, "Sensor disabled by the sink");
                self.stats.record_sensor_disabled();
            }
            Some(false) => tracing::info!(sensor = %id, "Sensor re-enabled by the sink"),
            None => {}
        }

        if response.rejected() {
            tracing::warn!(sensor = %id, "Sink rejected {request_type} request");
            ReportOutcome::Rejected(change)
        } else {
            tracing::debug!(sensor = %id, state = %state.value, units = state.units.as_deref().unwrap_or(""), "Sensor reported");
            ReportOutcome::Accepted(change)
        }
    }

    async fn run(self, mut queue: mpsc::UnboundedReceiver<SensorState>, mut shutdown: Shutdown) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                next = queue.recv() => match next {
                    Some(mut state) => {
                        let mut skipped = 0usize;
                        while let Ok(newer) = queue.try_recv() {
                            state = newer;
                            skipped += 1;
                        }
                        if skipped > 0 {
                            tracing::debug!(skipped, "Sending latest state only");
                        }
                        self.report(state).await;
                    }
                    None => break,
                },
            }
        }
        tracing::trace!("Reporter stopped");
    }
}

struct ReporterHandle {
    queue: mpsc::UnboundedSender<SensorState>,
    task: JoinHandle<()>,
}

/// Bridges producers into the registry and drives reporting.
pub struct SensorTracker {
    registry: Arc<SensorRegistry>,
    reporter: Reporter,
    stats: SharedReportStats,
    reporters: Mutex<HashMap<String, ReporterHandle>>,
    shutdown: Shutdown,
    span: tracing::Span,
}

impl SensorTracker {
    /// Create a tracker reporting to the sink described by `api`.
    ///
    /// With a `metadata` store, sensors keep their registered and disabled
    /// flags across restarts. An unreadable store starts from scratch.
    /// `span` is the parent of every task the tracker spawns.
    pub fn new(
        client: ApiClient,
        api: ApiConfig,
        stats: SharedReportStats,
        metadata: Option<MetadataStore>,
        shutdown: Shutdown,
        span: tracing::Span,
    ) -> Arc<Self> {
        let metadata = metadata.map(Arc::new);
        let known = match metadata.as_deref().map(MetadataStore::load) {
            Some(Ok(known)) => known,
            Some(Err(e)) => {
                tracing::warn!("Ignoring stored sensor metadata: {e}");
                HashMap::new()
            }
            None => HashMap::new(),
        };
        if !known.is_empty() {
            tracing::debug!(sensors = known.len(), "Restored sensor metadata");
        }

        let registry = Arc::new(SensorRegistry::with_known_metadata(known));
        let mut reporter = Reporter::new(Arc::clone(&registry), client, api, Arc::clone(&stats));
        if let Some(store) = metadata {
            reporter = reporter.with_store(store);
        }
        Arc::new(Self {
            registry,
            reporter,
            stats,
            reporters: Mutex::new(HashMap::new()),
            shutdown,
            span,
        })
    }

    pub fn registry(&self) -> &Arc<SensorRegistry> {
        &self.registry
    }

    /// Ids of all tracked sensors.
    pub fn sensor_list(&self) -> Vec<String> {
        self.registry.list()
    }

    pub fn sensor(&self, id: &str) -> Option<SensorState> {
        self.registry.get(id)
    }

    /// Launch one consumption loop per producer stream.
    ///
    /// A loop ends when its producer closes the stream or on shutdown.
    pub fn start(
        self: &Arc<Self>,
        producers: impl IntoIterator<Item = mpsc::Receiver<SensorUpdate>>,
    ) -> Vec<JoinHandle<()>> {
        producers
            .into_iter()
            .enumerate()
            .map(|(source, updates)| {
                let span = tracing::debug_span!(parent: &self.span, "producer", source);
                tokio::spawn(Arc::clone(self).consume(updates).instrument(span))
            })
            .collect()
    }

    async fn consume(self: Arc<Self>, mut updates: mpsc::Receiver<SensorUpdate>) {
        let mut shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => {
                    tracing::debug!("Stopping consumption on shutdown");
                    break;
                }
                update = updates.recv() => match update {
                    Some(update) => {
                        self.handle(update);
                    }
                    None => {
                        tracing::debug!("Producer closed its stream");
                        break;
                    }
                },
            }
        }
    }

    /// Merge an update into the registry and queue its report.
    ///
    /// Never waits on the network.
    pub fn handle(&self, update: SensorUpdate) -> Dispatch {
        self.stats.record_update_received();

        // Held across track and enqueue so queue order matches merge order.
        let mut reporters = self.reporters.lock();
        let Tracked { dispatch, state } = self.registry.track(update);

        if dispatch == Dispatch::Register {
            tracing::debug!(sensor = %state.id, "New sensor, queueing registration");
        }

        let id = state.id.clone();
        let handle = reporters
            .entry(id)
            .or_insert_with_key(|id| self.spawn_reporter(id));
        if handle.queue.send(state).is_err() {
            tracing::debug!("Reporter stopped, dropping update");
        }

        dispatch
    }

    fn spawn_reporter(&self, id: &str) -> ReporterHandle {
        let (queue, rx) = mpsc::unbounded_channel();
        let span = tracing::debug_span!(parent: &self.span, "reporter", sensor = %id);
        let task = tokio::spawn(
            self.reporter
                .clone()
                .run(rx, self.shutdown.clone())
                .instrument(span),
        );
        ReporterHandle { queue, task }
    }

    /// Stop accepting reports and wait until every queued report is done.
    pub async fn drain(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut reporters = self.reporters.lock();
            reporters.drain().map(|(_, handle)| handle.task).collect()
        };
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!("Reporter task failed: {e}");
            }
        }
    }
}
