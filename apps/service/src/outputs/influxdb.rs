use std::time::Duration;

use probehub::{Measurement, Output, OutputConfig, PluginError};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

const MEASUREMENT_NAME: &str = "latency";
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct InfluxOptions {
    url: String,
    token: String,
    org: String,
    bucket: String,
}

/// Writes each measurement as one InfluxDB v2 line-protocol point.
pub struct InfluxOutput {
    name: String,
    client: reqwest::Client,
    write_url: Url,
    authorization: String,
}

/// Escape a tag value: backslashes, commas, spaces and equals signs need a
/// backslash.
fn escape_tag(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ',' | ' ' | '=') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn line_protocol(m: &Measurement) -> String {
    format!("{MEASUREMENT_NAME},probe={} value={} {}", escape_tag(m.source()), m.value(), m.timestamp())
}

impl InfluxOutput {
    pub fn from_config(cfg: &OutputConfig) -> Result<Self, PluginError> {
        let opts: InfluxOptions = cfg.options()?;

        let base = Url::parse(&opts.url)
            .map_err(|e| PluginError::config(format!("{}: invalid url {:?}: {e}", cfg.name, opts.url)))?;
        let mut write_url = base
            .join("api/v2/write")
            .map_err(|e| PluginError::config(format!("{}: {e}", cfg.name)))?;
        write_url
            .query_pairs_mut()
            .append_pair("org", &opts.org)
            .append_pair("bucket", &opts.bucket)
            .append_pair("precision", "s");

        let client = reqwest::Client::builder().timeout(WRITE_TIMEOUT).build().map_err(PluginError::backend)?;

        Ok(Self { name: cfg.name.clone(), client, write_url, authorization: format!("Token {}", opts.token) })
    }
}

#[async_trait::async_trait]
impl Output for InfluxOutput {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, measurement: &Measurement) {
        let body = line_protocol(measurement);

        let response = self
            .client
            .post(self.write_url.clone())
            .header(AUTHORIZATION, &self.authorization)
            .body(body)
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => {
                debug!(output = %self.name, source = %measurement.source(), "Point written");
            }
            Ok(response) => {
                let status = response.status();
                let detail = response.text().await.unwrap_or_default();
                warn!(output = %self.name, %status, detail = %detail.trim(), "InfluxDB rejected write");
            }
            Err(e) => warn!(output = %self.name, error = %e, "InfluxDB write failed"),
        }
    }
}
