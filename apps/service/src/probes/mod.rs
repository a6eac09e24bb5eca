//! Probe plugins: `ping`, `tcp`, `http`, `dns` and `mtr`.

pub mod checker;
pub mod dns;
pub mod mtr;
pub mod validation;

use std::time::Duration;

use probehub::{PluginError, Probe, ProbeConfig, Registry};
use serde::Deserialize;
use tracing::warn;

use checker::{CheckProbe, Checker, HttpChecker, IcmpChecker, TcpChecker};
use dns::DnsChecker;
use mtr::MtrProbe;
use validation::{ValidationResult, validate_host, validate_http_endpoint, validate_socket_endpoint, validate_timeout};

const PING_TIMEOUT: Duration = Duration::from_secs(3);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct TimeoutOptions {
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
}

/// Decode the `timeout` option and validate the target with `validate`.
fn prepare(
    cfg: &ProbeConfig,
    default_timeout: Duration,
    validate: fn(&str) -> ValidationResult,
) -> Result<Duration, PluginError> {
    let opts: TimeoutOptions = cfg.options()?;
    let timeout = opts.timeout.unwrap_or(default_timeout);

    validate(&cfg.target).into_result(&cfg.name)?;
    let check = validate_timeout(timeout, cfg.interval);
    if let Some(msg) = check.error.filter(|_| !check.is_valid) {
        warn!(probe = %cfg.name, timeout = ?timeout, interval = ?cfg.interval, "{msg}");
    }

    Ok(timeout)
}

fn boxed<C: Checker + 'static>(cfg: &ProbeConfig, checker: C) -> Box<dyn Probe> {
    Box::new(CheckProbe::new(cfg, checker))
}

pub fn ping(cfg: &ProbeConfig) -> Result<Box<dyn Probe>, PluginError> {
    let timeout = prepare(cfg, PING_TIMEOUT, validate_host)?;
    Ok(boxed(cfg, IcmpChecker::new(timeout)))
}

pub fn tcp(cfg: &ProbeConfig) -> Result<Box<dyn Probe>, PluginError> {
    let timeout = prepare(cfg, CONNECT_TIMEOUT, validate_socket_endpoint)?;
    Ok(boxed(cfg, TcpChecker::new(timeout)))
}

pub fn http(cfg: &ProbeConfig) -> Result<Box<dyn Probe>, PluginError> {
    let timeout = prepare(cfg, CONNECT_TIMEOUT, validate_http_endpoint)?;
    let checker = HttpChecker::new(timeout).map_err(PluginError::backend)?;
    Ok(boxed(cfg, checker))
}

pub fn dns(cfg: &ProbeConfig) -> Result<Box<dyn Probe>, PluginError> {
    Ok(boxed(cfg, DnsChecker::from_config(cfg)?))
}

pub fn mtr(cfg: &ProbeConfig) -> Result<Box<dyn Probe>, PluginError> {
    Ok(Box::new(MtrProbe::from_config(cfg)?))
}

/// Register every probe type this binary ships.
pub fn register(registry: &mut Registry) {
    registry
        .register_probe("ping", ping)
        .register_probe("tcp", tcp)
        .register_probe("http", http)
        .register_probe("dns", dns)
        .register_probe("mtr", mtr);
}
