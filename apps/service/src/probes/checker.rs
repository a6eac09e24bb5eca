use std::net::IpAddr;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use probehub::{CancellationToken, Measurement, MeasurementSink, Probe, ProbeConfig, run_every};
use surge_ping::{Client, Config, ICMP, PingIdentifier, PingSequence};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Checker trait for the single-measurement probe types
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Perform one check and return the latency in milliseconds
    async fn check(&self, target: &str) -> Result<f64>;
}

pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// First address `host` resolves to; IP literals are returned as is.
pub(crate) async fn resolve_host(host: &str) -> Result<IpAddr> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(ip);
    }

    tokio::net::lookup_host(format!("{host}:0"))
        .await?
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| anyhow!("no addresses found for {host}"))
}

/// Probe that runs one [`Checker`] against its target every interval.
pub struct CheckProbe<C> {
    name: String,
    target: String,
    interval: Duration,
    checker: C,
}

impl<C: Checker> CheckProbe<C> {
    pub fn new(cfg: &ProbeConfig, checker: C) -> Self {
        Self { name: cfg.name.clone(), target: cfg.target.clone(), interval: cfg.interval, checker }
    }

    async fn cycle(&self) -> Vec<Measurement> {
        match self.checker.check(&self.target).await {
            Ok(latency_ms) => {
                debug!(probe = %self.name, target = %self.target, latency_ms, "Check succeeded");
                vec![Measurement::new(&self.name, latency_ms)]
            }
            Err(e) => {
                warn!(probe = %self.name, target = %self.target, error = %e, "Check failed");
                vec![Measurement::failed(&self.name)]
            }
        }
    }
}

#[async_trait::async_trait]
impl<C: Checker> Probe for CheckProbe<C> {
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

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, target: &str) -> Result<f64> {
        let start = Instant::now();

        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|e| anyhow!("HTTP request failed: {}", e))?;

        let latency = elapsed_ms(start);
        let status = response.status();

        // Consider 2xx and 3xx as success
        if status.is_success() || status.is_redirection() {
            Ok(latency)
        } else {
            Err(anyhow!("HTTP check failed with status code: {}", status.as_u16()))
        }
    }
}

/// TCP connect checker
pub struct TcpChecker {
    timeout_duration: Duration,
}

impl TcpChecker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout_duration: timeout }
    }
}

#[async_trait::async_trait]
impl Checker for TcpChecker {
    async fn check(&self, target: &str) -> Result<f64> {
        let start = Instant::now();

        let connect = tokio::net::TcpStream::connect(target);

        timeout(self.timeout_duration, connect)
            .await
            .map_err(|_| anyhow!("TCP connection timeout"))?
            .map_err(|e| anyhow!("TCP connection failed: {}", e))?;

        Ok(elapsed_ms(start))
    }
}

/// ICMP echo checker; needs raw or unprivileged ICMP sockets on the host
pub struct IcmpChecker {
    timeout_duration: Duration,
}

impl IcmpChecker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout_duration: timeout }
    }
}

#[async_trait::async_trait]
impl Checker for IcmpChecker {
    async fn check(&self, target: &str) -> Result<f64> {
        let ip = resolve_host(target).await?;

        let client = match ip {
            IpAddr::V4(_) => Client::new(&Config::default()),
            IpAddr::V6(_) => Client::new(&Config::builder().kind(ICMP::V6).build()),
        }
        .map_err(|e| anyhow!("failed to open ICMP socket: {}", e))?;

        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(self.timeout_duration);

        let (_, rtt) = timeout(self.timeout_duration, pinger.ping(PingSequence(0), &[]))
            .await
            .map_err(|_| anyhow!("ping timed out"))?
            .map_err(|e| anyhow!("ping failed: {}", e))?;

        Ok(rtt.as_secs_f64() * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use probehub::FAILURE_SENTINEL;
    use tokio::sync::mpsc;

    use super::*;

    struct Scripted {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Checker for Scripted {
        async fn check(&self, _target: &str) -> Result<f64> {
            // Every second call fails.
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                Err(anyhow!("unreachable"))
            } else {
                Ok(4.25)
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_probe_emits_latency_or_sentinel() {
        let cfg = ProbeConfig::new("svc", "scripted", "svc.invalid").with_interval(Duration::from_secs(1));
        let probe = CheckProbe::new(&cfg, Scripted { calls: AtomicUsize::new(0) });
        let (tx, mut rx) = mpsc::channel(10);
        let cancel = CancellationToken::new();

        let run = {
            let cancel = cancel.clone();
            async move { probe.run(cancel, MeasurementSink::new(tx)).await }
        };
        let handle = tokio::spawn(run);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        cancel.cancel();
        handle.await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.source(), "svc");
        assert_eq!(first.value(), 4.25);
        assert_eq!(second.value(), FAILURE_SENTINEL);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_tcp_checker_measures_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let latency = TcpChecker::new(Duration::from_secs(2)).check(&addr.to_string()).await.unwrap();
        assert!(latency >= 0.0);
    }

    #[tokio::test]
    async fn test_tcp_checker_reports_refused_connection() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = TcpChecker::new(Duration::from_secs(2)).check(&addr.to_string()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_resolve_host_accepts_literals() {
        assert_eq!(resolve_host("127.0.0.1").await.unwrap(), IpAddr::from([127, 0, 0, 1]));
        assert!(resolve_host("::1").await.unwrap().is_ipv6());
    }
}
