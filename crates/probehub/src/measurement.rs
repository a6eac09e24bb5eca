use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Latency value marking a failed or unreachable cycle.
///
/// Kept distinct from `0.0`, which is a valid (if suspicious) latency.
pub const FAILURE_SENTINEL: f64 = -1.0;

/// One latency sample, the only thing that crosses the pipeline.
///
/// Fields are private so a record cannot change after it was emitted;
/// receivers get a shared reference and copy what they need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    source: String,
    timestamp: i64,
    value: f64,
}

impl Measurement {
    /// Build a measurement stamped with the current time.
    pub fn new(source: impl Into<String>, value: f64) -> Self {
        Self::at(source, chrono::Utc::now().timestamp(), value)
    }

    /// Build a measurement with an explicit Unix timestamp (seconds).
    pub fn at(source: impl Into<String>, timestamp: i64, value: f64) -> Self {
        Self { source: source.into(), timestamp, value }
    }

    /// Sentinel record for a cycle that produced no latency.
    pub fn failed(source: impl Into<String>) -> Self {
        Self::new(source, FAILURE_SENTINEL)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Seconds since the Unix epoch, assigned by the producer.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Latency in milliseconds, or a negative sentinel.
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_failure(&self) -> bool {
        self.value < 0.0
    }

    /// Latency if the cycle succeeded.
    pub fn latency_ms(&self) -> Option<f64> {
        (!self.is_failure()).then_some(self.value)
    }
}

/// Returned by [`MeasurementSink::emit`] once nobody drains the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("measurement channel closed")]
pub struct SinkClosed;

/// Producer side of the shared measurement channel handed to every probe.
#[derive(Debug, Clone)]
pub struct MeasurementSink {
    tx: mpsc::Sender<Measurement>,
}

impl MeasurementSink {
    pub fn new(tx: mpsc::Sender<Measurement>) -> Self {
        Self { tx }
    }

    /// Push a measurement, waiting while the channel is full.
    pub async fn emit(&self, measurement: Measurement) -> Result<(), SinkClosed> {
        self.tx.send(measurement).await.map_err(|_| SinkClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_measurement_carries_sentinel() {
        let m = Measurement::failed("gw");
        assert_eq!(m.value(), FAILURE_SENTINEL);
        assert_eq!(m.source(), "gw");
        assert!(m.is_failure());
        assert!(m.latency_ms().is_none());
        assert!(m.timestamp() > 0);
    }

    #[test]
    fn test_zero_latency_is_not_failure() {
        let m = Measurement::at("lo", 1_700_000_000, 0.0);
        assert!(!m.is_failure());
        assert_eq!(m.latency_ms(), Some(0.0));
    }

    #[test]
    fn test_json_field_names() {
        let m = Measurement::at("gw_10.0.0.1", 1_700_000_000, 12.5);
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "source": "gw_10.0.0.1", "timestamp": 1_700_000_000, "value": 12.5 })
        );
    }

    #[tokio::test]
    async fn test_sink_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        let sink = MeasurementSink::new(tx);
        drop(rx);
        assert!(sink.is_closed());
        assert_eq!(sink.emit(Measurement::failed("x")).await, Err(SinkClosed));
    }
}
