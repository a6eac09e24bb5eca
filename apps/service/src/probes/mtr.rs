//! Per-hop latency from `mtr` report mode.
//!
//! Each cycle runs `mtr -r -c <count> -4|-6 <target>` and emits one
//! measurement per hop named `{probe}_{hop}`, valued with the hop's average
//! round trip. A failed run, or a report without hops, emits one failure
//! sentinel under the probe name instead.
//!
//! `-4` is used only for targets known to have no IPv6 address. A target
//! that does not resolve is traced with `-6` and resolved again next cycle.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use probehub::{CancellationToken, Measurement, MeasurementSink, PluginError, Probe, ProbeConfig, run_every};
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::validation::validate_host;

const MTR_BINARY: &str = "mtr";
const DEFAULT_COUNT: u32 = 5;

fn default_count() -> u32 {
    DEFAULT_COUNT
}

#[derive(Debug, Deserialize)]
struct MtrOptions {
    /// Pings per hop in one report.
    #[serde(default = "default_count")]
    count: u32,
    /// Explicit binary instead of searching `PATH`.
    mtr_path: Option<PathBuf>,
}

/// The configured binary if it is executable, otherwise `mtr` from `PATH`.
fn locate_binary(configured: Option<&Path>) -> Result<PathBuf, PluginError> {
    match configured {
        Some(path) => which::which(path)
            .map_err(|e| PluginError::Unavailable(format!("{}: {e}", path.display()))),
        None => which::which(MTR_BINARY)
            .map_err(|e| PluginError::Unavailable(format!("mtr not found in PATH: {e}"))),
    }
}

/// Report rows as `(hop, average ms)`, header lines and unparsable rows skipped.
fn parse_report(report: &str) -> Vec<(String, f64)> {
    report
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !(trimmed.is_empty()
                || trimmed.starts_with("HOST:")
                || trimmed.starts_with("Start:")
                || trimmed.starts_with("My traceroute")
                || trimmed.contains("Loss%"))
        })
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 {
                return None;
            }
            match fields[5].parse::<f64>() {
                Ok(avg) => Some((fields[1].replace('/', "_"), avg)),
                Err(e) => {
                    debug!(line, error = %e, "Skipping unparsable mtr row");
                    None
                }
            }
        })
        .collect()
}

pub struct MtrProbe {
    name: String,
    target: String,
    interval: Duration,
    count: u32,
    binary: PathBuf,
    /// Resolved once, on the first cycle that manages to resolve the target.
    ipv6: OnceCell<bool>,
}

impl MtrProbe {
    pub fn from_config(cfg: &ProbeConfig) -> Result<Self, PluginError> {
        let opts: MtrOptions = cfg.options()?;
        validate_host(&cfg.target).into_result(&cfg.name)?;

        let binary = locate_binary(opts.mtr_path.as_deref())?;
        if opts.count == 0 {
            return Err(PluginError::config(format!("{}: count must be at least 1", cfg.name)));
        }

        Ok(Self {
            name: cfg.name.clone(),
            target: cfg.target.clone(),
            interval: cfg.interval,
            count: opts.count,
            binary,
            ipv6: OnceCell::new(),
        })
    }

    /// IPv6 when the target has any IPv6 address, IPv4 otherwise.
    async fn prefers_ipv6(&self) -> Result<bool> {
        let target = self.target.as_str();
        self.ipv6
            .get_or_try_init(|| async move {
                if let Ok(ip) = target.parse::<IpAddr>() {
                    return Ok(ip.is_ipv6());
                }
                let mut addrs = tokio::net::lookup_host(format!("{target}:0")).await?.peekable();
                if addrs.peek().is_none() {
                    bail!("no addresses found for {target}");
                }
                Ok(addrs.any(|addr| addr.is_ipv6()))
            })
            .await
            .copied()
    }

    async fn family(&self) -> &'static str {
        match self.prefers_ipv6().await {
            Ok(false) => "-4",
            Ok(true) => "-6",
            Err(e) => {
                debug!(probe = %self.name, target = %self.target, error = %e, "Target did not resolve; tracing over IPv6");
                "-6"
            }
        }
    }

    async fn report(&self) -> Result<String> {
        let family = self.family().await;
        debug!(probe = %self.name, target = %self.target, family, "Running mtr");

        let output = Command::new(&self.binary)
            .arg("-r")
            .arg("-c")
            .arg(self.count.to_string())
            .arg(family)
            .arg(&self.target)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("mtr exited with {}: {}", output.status, stderr.trim()));
        }
        Ok(stdout)
    }

    async fn cycle(&self) -> Vec<Measurement> {
        let report = match self.report().await {
            Ok(report) => report,
            Err(e) => {
                warn!(probe = %self.name, target = %self.target, error = %e, "mtr run failed");
                return vec![Measurement::failed(&self.name)];
            }
        };

        let hops: Vec<Measurement> = parse_report(&report)
            .into_iter()
            .map(|(hop, avg)| Measurement::new(format!("{}_{hop}", self.name), avg))
            .collect();

        if hops.is_empty() {
            warn!(probe = %self.name, "mtr report had no hops");
            return vec![Measurement::failed(&self.name)];
        }
        hops
    }
}

#[async_trait::async_trait]
impl Probe for MtrProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, cancel: CancellationToken, sink: MeasurementSink) {
        run_every(self.interval, &cancel, &sink, || self.cycle()).await;
    }
}
