//! DNS resolution latency over the system resolver, TCP, DoT or DoH.

use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use probehub::{PluginError, ProbeConfig};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tokio::time::timeout;

use super::checker::{Checker, elapsed_ms};
use super::validation::{validate_host, validate_http_endpoint, validate_socket_endpoint};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DNS_PORT: u16 = 53;
const DOT_PORT: u16 = 853;
const DOH_CONTENT_TYPE: &str = "application/dns-json";

#[derive(Debug, Deserialize)]
struct DnsOptions {
    protocol: Option<String>,
    resolver: Option<String>,
    /// Certificate name for DoT; defaults to the resolver's host.
    tls_name: Option<String>,
    doh_url: Option<String>,
    #[serde(default, with = "humantime_serde")]
    timeout: Option<Duration>,
}

enum Transport {
    /// Whatever the host's resolver configuration says.
    System,
    /// One named server over TCP or TLS.
    Server {
        address: String,
        protocol: Protocol,
        tls_name: Option<String>,
        /// Built on first use, since `address` may need resolving itself.
        resolver: OnceCell<TokioAsyncResolver>,
    },
    Doh { client: reqwest::Client, url: String },
}

pub struct DnsChecker {
    transport: Transport,
    timeout: Duration,
}

/// Append `port` to a resolver address that has none.
fn with_default_port(resolver: &str, port: u16) -> String {
    match resolver.parse::<IpAddr>() {
        Ok(IpAddr::V6(ip)) => format!("[{ip}]:{port}"),
        Ok(IpAddr::V4(ip)) => format!("{ip}:{port}"),
        Err(_) if resolver.contains(':') => resolver.to_string(),
        Err(_) => format!("{resolver}:{port}"),
    }
}

/// Host part of a `host:port` resolver address.
fn host_of(address: &str) -> String {
    match address.parse::<SocketAddr>() {
        Ok(addr) => addr.ip().to_string(),
        Err(_) => address.rsplit_once(':').map_or(address, |(host, _)| host).to_string(),
    }
}

impl DnsChecker {
    pub fn from_config(cfg: &ProbeConfig) -> Result<Self, PluginError> {
        let opts: DnsOptions = cfg.options()?;
        validate_host(&cfg.target).into_result(&cfg.name)?;
        let timeout = opts.timeout.unwrap_or(DEFAULT_TIMEOUT);

        let server_address = |label: &str, port: u16| -> Result<String, PluginError> {
            let address = opts.resolver.as_deref().map(|r| with_default_port(r, port)).ok_or_else(|| {
                PluginError::config(format!("{}: {label} needs `resolver`", cfg.name))
            })?;
            validate_socket_endpoint(&address).into_result(&cfg.name)?;
            Ok(address)
        };

        let transport = match opts.protocol.as_deref().unwrap_or("udp") {
            "udp" => Transport::System,
            "tcp" => {
                let address = server_address("tcp", DNS_PORT)?;
                Transport::Server { address, protocol: Protocol::Tcp, tls_name: None, resolver: OnceCell::new() }
            }
            "dot" => {
                let address = server_address("dot", DOT_PORT)?;
                let tls_name = opts.tls_name.clone().unwrap_or_else(|| host_of(&address));
                Transport::Server {
                    address,
                    protocol: Protocol::Tls,
                    tls_name: Some(tls_name),
                    resolver: OnceCell::new(),
                }
            }
            "doh" => {
                let url = opts
                    .doh_url
                    .clone()
                    .ok_or_else(|| PluginError::config(format!("{}: doh needs `doh_url`", cfg.name)))?;
                validate_http_endpoint(&url).into_result(&cfg.name)?;
                let client = reqwest::Client::builder()
                    .timeout(timeout)
                    .build()
                    .map_err(PluginError::backend)?;
                Transport::Doh { client, url }
            }
            other => {
                return Err(PluginError::config(format!("{}: unknown DNS protocol {other:?}", cfg.name)));
            }
        };

        Ok(Self { transport, timeout })
    }

    async fn lookup(&self, name: &str) -> Result<()> {
        match &self.transport {
            Transport::System => {
                let found = tokio::net::lookup_host(format!("{name}:0")).await?.count();
                if found == 0 {
                    bail!("no addresses found for {name}");
                }
                Ok(())
            }
            Transport::Server { address, protocol, tls_name, resolver } => {
                let resolver = resolver
                    .get_or_try_init(|| single_server(address, *protocol, tls_name.clone(), self.timeout))
                    .await?;
                resolver.lookup_ip(name).await?;
                Ok(())
            }
            Transport::Doh { client, url } => query_over_https(client, url, name).await,
        }
    }
}

#[async_trait::async_trait]
impl Checker for DnsChecker {
    async fn check(&self, target: &str) -> Result<f64> {
        let start = Instant::now();

        timeout(self.timeout, self.lookup(target))
            .await
            .map_err(|_| anyhow!("DNS lookup timed out"))??;

        Ok(elapsed_ms(start))
    }
}

/// Resolver that asks only `address`, once per lookup, with no answer cache.
async fn single_server(
    address: &str,
    protocol: Protocol,
    tls_name: Option<String>,
    timeout: Duration,
) -> Result<TokioAsyncResolver> {
    let socket_addr = tokio::net::lookup_host(address)
        .await?
        .next()
        .ok_or_else(|| anyhow!("resolver {address} has no addresses"))?;

    let mut server = NameServerConfig::new(socket_addr, protocol);
    server.tls_dns_name = tls_name;
    let config = ResolverConfig::from_parts(None, vec![], vec![server]);

    let mut opts = ResolverOpts::default();
    opts.timeout = timeout;
    opts.attempts = 1;
    opts.cache_size = 0;
    opts.use_hosts_file = false;

    Ok(TokioAsyncResolver::tokio(config, opts))
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "Status")]
    status: u16,
}

async fn query_over_https(client: &reqwest::Client, url: &str, name: &str) -> Result<()> {
    let answer: DohAnswer = client
        .get(url)
        .query(&[("name", name), ("type", "A")])
        .header(ACCEPT, DOH_CONTENT_TYPE)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    match answer.status {
        0 => Ok(()),
        rcode => Err(anyhow!("resolver answered with rcode {rcode}")),
    }
}
