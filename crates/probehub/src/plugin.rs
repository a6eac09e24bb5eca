//! Probe and output capabilities.
//!
//! Concrete kinds live outside this crate and are wired in through the
//! [`Registry`](crate::Registry). A probe owns its schedule; an output only
//! reacts to what the dispatch loop hands it.
use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;

use crate::error::PluginError;
use crate::measurement::{Measurement, MeasurementSink};

/// Shortest period [`run_every`] will tick at.
pub const MIN_TICK: Duration = Duration::from_millis(1);

/// Something that measures a target on its own schedule.
///
/// # Contract
///
/// `run` loops until `cancel` fires and must return promptly afterwards, even
/// mid-measurement. A failed cycle is reported as a sentinel
/// [`Measurement::failed`], never as an error. Nothing may be emitted after
/// `run` returns.
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    fn name(&self) -> &str;

    fn interval(&self) -> Duration;

    async fn run(&self, cancel: CancellationToken, sink: MeasurementSink);
}

/// Something that persists or forwards measurements.
///
/// # Contract
///
/// - `start` does one-time setup and returns; long-running service loops are
///   spawned by the output itself.
/// - `send` must not block indefinitely: the dispatch loop awaits it before
///   moving to the next output. Failures are handled (logged) internally.
/// - `stop` is called exactly once, at shutdown, and releases everything.
#[async_trait::async_trait]
pub trait Output: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&mut self) -> Result<(), PluginError> {
        Ok(())
    }

    async fn send(&self, measurement: &Measurement);

    async fn stop(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// Cooperative tick loop shared by probe implementations.
///
/// The first cycle runs one `interval` after the call. Each cycle's
/// measurements are pushed in order. Returns when `cancel` fires (checked
/// while waiting, measuring and emitting) or when the sink is closed.
/// Ticks missed behind a slow cycle are delayed rather than replayed.
pub async fn run_every<F, Fut>(
    interval: Duration,
    cancel: &CancellationToken,
    sink: &MeasurementSink,
    mut cycle: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Vec<Measurement>>,
{
    let period = interval.max(MIN_TICK);
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let batch = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            batch = cycle() => batch,
        };

        for measurement in batch {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                sent = sink.emit(measurement) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
