//! Declarative records the registry and orchestrator consume.
//!
//! Only `name`, `type`, `target` and `interval` have meaning to the core.
//! Every other key of a probe or output entry lands in `options` and is
//! decoded by the plugin itself.

use std::collections::HashSet;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{OrchestratorError, PluginError};

/// Capacity of the shared measurement channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;
/// How long shutdown waits for probe tasks before aborting them.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
/// Probe schedule used when an entry omits `interval`.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);

fn default_interval() -> Duration {
    DEFAULT_PROBE_INTERVAL
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_shutdown_grace() -> Duration {
    DEFAULT_SHUTDOWN_GRACE
}

fn decode_options<T: DeserializeOwned>(name: &str, options: &toml::Table) -> Result<T, PluginError> {
    toml::Value::Table(options.clone())
        .try_into()
        .map_err(|e| PluginError::config(format!("{name}: {e}")))
}

/// One `[[probes]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub target: String,
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
    /// Type-specific keys, passed opaquely to the constructor.
    #[serde(flatten)]
    pub options: toml::Table,
}

impl ProbeConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            target: target.into(),
            interval: DEFAULT_PROBE_INTERVAL,
            options: toml::Table::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Decode the type-specific options into a plugin's own struct.
    pub fn options<T: DeserializeOwned>(&self) -> Result<T, PluginError> {
        decode_options(&self.name, &self.options)
    }

    /// Why this entry is unusable whatever its type, if it is.
    pub fn defect(&self) -> Option<&'static str> {
        if self.name.trim().is_empty() {
            Some("missing name")
        } else if self.interval.is_zero() {
            Some("zero interval")
        } else {
            None
        }
    }
}

/// One `[[outputs]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub options: toml::Table,
}

impl OutputConfig {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { name: name.into(), kind: kind.into(), options: toml::Table::new() }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn options<T: DeserializeOwned>(&self) -> Result<T, PluginError> {
        decode_options(&self.name, &self.options)
    }

    pub fn defect(&self) -> Option<&'static str> {
        self.name.trim().is_empty().then_some("missing name")
    }
}

/// Tuning for the dispatch stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchSettings {
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_shutdown_grace", with = "humantime_serde")]
    pub shutdown_grace: Duration,
    /// Upper bound for a single output `send`. `None` waits forever, so a
    /// hung output stalls the whole pipeline.
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub send_timeout: Option<Duration>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            send_timeout: None,
        }
    }
}

/// Everything the orchestrator is built from, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub probes: Vec<ProbeConfig>,
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
}

impl PipelineConfig {
    pub fn with_probe(mut self, probe: ProbeConfig) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn with_output(mut self, output: OutputConfig) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchSettings) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Reject dispatch settings the pipeline cannot run with.
    ///
    /// Individual entries are not checked here: a bad entry is skipped when
    /// the registry refuses it, so it cannot stop the others from running.
    /// Duplicate names are legal (measurements would just share a label), so
    /// they only produce a warning.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.dispatch.channel_capacity == 0 {
            return Err(OrchestratorError::InvalidSettings(
                "channel_capacity must be at least 1".into(),
            ));
        }
        if self.dispatch.send_timeout.is_some_and(|t| t.is_zero()) {
            return Err(OrchestratorError::InvalidSettings("send_timeout must be non-zero".into()));
        }

        let mut seen = HashSet::new();
        for probe in &self.probes {
            if !seen.insert(probe.name.as_str()) {
                warn!(probe = %probe.name, "Duplicate probe name; measurements will share a source label");
            }
        }

        let mut seen = HashSet::new();
        for output in &self.outputs {
            if !seen.insert(output.name.as_str()) {
                warn!(output = %output.name, "Duplicate output name");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[dispatch]
channel_capacity = 16
send_timeout = "250ms"

[[probes]]
name = "resolver"
type = "dns"
target = "example.com"
interval = "10s"
protocol = "tcp"
resolver = "9.9.9.9:53"

[[probes]]
name = "gw"
type = "ping"
target = "192.0.2.1"

[[outputs]]
name = "csv"
type = "file"
path = "/tmp/latency.csv"
"#;

    #[derive(Debug, Deserialize)]
    struct DnsOptions {
        protocol: String,
        resolver: String,
    }

    #[test]
    fn test_parse_pipeline_config() {
        let config: PipelineConfig = toml::from_str(SAMPLE).unwrap();

        assert_eq!(config.dispatch.channel_capacity, 16);
        assert_eq!(config.dispatch.send_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.dispatch.shutdown_grace, DEFAULT_SHUTDOWN_GRACE);

        assert_eq!(config.probes.len(), 2);
        assert_eq!(config.probes[0].kind, "dns");
        assert_eq!(config.probes[0].interval, Duration::from_secs(10));
        assert_eq!(config.probes[1].interval, DEFAULT_PROBE_INTERVAL);
        assert!(config.probes[1].options.is_empty());

        assert_eq!(config.outputs[0].options.get("path").and_then(|v| v.as_str()), Some("/tmp/latency.csv"));
    }

    #[test]
    fn test_core_keys_do_not_leak_into_options() {
        let config: PipelineConfig = toml::from_str(SAMPLE).unwrap();
        let options = &config.probes[0].options;
        assert!(!options.contains_key("name"));
        assert!(!options.contains_key("type"));
        assert!(!options.contains_key("interval"));
        assert_eq!(options.len(), 2);
    }

    #[test]
    fn test_decode_typed_options() {
        let config: PipelineConfig = toml::from_str(SAMPLE).unwrap();
        let opts: DnsOptions = config.probes[0].options().unwrap();
        assert_eq!(opts.protocol, "tcp");
        assert_eq!(opts.resolver, "9.9.9.9:53");

        let err = config.probes[1].options::<DnsOptions>().unwrap_err();
        assert!(matches!(err, PluginError::Config(_)));
        assert!(err.to_string().contains("gw"));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = PipelineConfig::default()
            .with_dispatch(DispatchSettings { channel_capacity: 0, ..Default::default() });
        assert!(matches!(config.validate(), Err(OrchestratorError::InvalidSettings(_))));
    }

    #[test]
    fn test_validate_leaves_bad_entries_to_the_registry() {
        let config = PipelineConfig::default()
            .with_probe(ProbeConfig::new("p", "ping", "192.0.2.1").with_interval(Duration::ZERO))
            .with_probe(ProbeConfig::new("typo", "", "192.0.2.2"))
            .with_output(OutputConfig::new("", "file"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_entry_defects() {
        assert_eq!(ProbeConfig::new("p", "ping", "a").defect(), None);
        assert_eq!(ProbeConfig::new(" ", "ping", "a").defect(), Some("missing name"));
        assert_eq!(
            ProbeConfig::new("p", "ping", "a").with_interval(Duration::ZERO).defect(),
            Some("zero interval")
        );
        assert_eq!(OutputConfig::new("", "file").defect(), Some("missing name"));
        assert_eq!(OutputConfig::new("csv", "file").defect(), None);
    }

    #[test]
    fn test_validate_allows_duplicate_names() {
        let config = PipelineConfig::default()
            .with_probe(ProbeConfig::new("p", "ping", "a"))
            .with_probe(ProbeConfig::new("p", "ping", "b"));
        assert!(config.validate().is_ok());
    }
}
