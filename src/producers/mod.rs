//! Sensor producers.
//!
//! A producer samples some part of the host on an interval and emits
//! [`SensorUpdate`]s. Each producer runs in its own task and hands its
//! samples to the tracker over a channel; closing the channel retires it.

#[cfg(feature = "system")]
pub mod system;

use crate::config::ProducerConfig;
use crate::sensor::SensorUpdate;
use crate::shutdown::Shutdown;
use std::time::Duration;
use tokio::sync::mpsc;

/// Capacity of each producer's channel to the tracker.
const CHANNEL_CAPACITY: usize = 64;

/// A source of sensor updates.
pub trait SensorProducer: Send + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Take one sample. An empty result is skipped.
    fn sample(&mut self) -> Vec<SensorUpdate>;
}

/// Run `producer` every `interval` until shutdown.
///
/// The first sample is taken immediately. The returned channel closes when
/// the producer stops.
pub fn spawn_producer(
    mut producer: Box<dyn SensorProducer>,
    interval: Duration,
    mut shutdown: Shutdown,
) -> mpsc::Receiver<SensorUpdate> {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let name = producer.name();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        'sampling: loop {
            tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                _ = ticker.tick() => {}
            }

            let updates = producer.sample();
            tracing::trace!(producer = name, count = updates.len(), "Sampled");
            for update in updates {
                if tx.send(update).await.is_err() {
                    tracing::debug!(producer = name, "Tracker gone, stopping producer");
                    break 'sampling;
                }
            }
        }
        tracing::debug!(producer = name, "Producer stopped");
    });

    rx
}

/// Build the producers enabled in `config`.
///
/// Returns nothing when the crate is built without the `system` feature.
pub fn build_producers(config: &ProducerConfig) -> Vec<Box<dyn SensorProducer>> {
    #[allow(unused_mut)]
    let mut producers: Vec<Box<dyn SensorProducer>> = Vec::new();

    #[cfg(feature = "system")]
    {
        if config.memory {
            producers.push(Box::new(system::MemoryProducer::new()));
        }
        if config.load {
            producers.push(Box::new(system::LoadProducer));
        }
        if config.uptime {
            producers.push(Box::new(system::UptimeProducer));
        }
        if config.users {
            producers.push(Box::new(system::UsersProducer::new()));
        }
    }
    #[cfg(not(feature = "system"))]
    {
        let _ = config;
        tracing::warn!("Built without the system feature, no producers available");
    }

    producers
}
