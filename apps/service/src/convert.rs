//! Conversion of SmokePing `Targets` files into `[[probes]]` entries.
//!
//! Every line starting with `++` opens a new target. Within a target only
//! `menu`, `probe`, `host`, `lookup` and `server` are read; `probe = DNS`
//! becomes a `dns` probe, everything else becomes `ping`.

use std::io::BufRead;
use std::time::Duration;

use probehub::ProbeConfig;
use serde::Serialize;
use tracing::warn;

const CONVERTED_INTERVAL: Duration = Duration::from_secs(5);
const DNS_PORT: &str = "53";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Target {
    menu: String,
    probe: String,
    host: String,
    lookup: String,
    server: String,
}

impl Target {
    fn into_probe(self) -> ProbeConfig {
        if !self.probe.eq_ignore_ascii_case("dns") {
            return ProbeConfig::new(self.menu, "ping", self.host).with_interval(CONVERTED_INTERVAL);
        }

        let target = if self.lookup.is_empty() { self.host.clone() } else { self.lookup };
        let mut resolver = if self.server.is_empty() { self.host } else { self.server };
        if !resolver.contains(':') {
            resolver = format!("{resolver}:{DNS_PORT}");
        }

        ProbeConfig::new(self.menu, "dns", target)
            .with_interval(CONVERTED_INTERVAL)
            .with_option("resolver", resolver)
    }
}

fn parse_targets(reader: impl BufRead) -> std::io::Result<Vec<Target>> {
    let mut targets = Vec::new();
    let mut current: Option<Target> = None;

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();

        if trimmed.starts_with("++") {
            targets.extend(current.replace(Target::default()));
            continue;
        }
        let Some(target) = current.as_mut() else {
            continue;
        };
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };

        let value = value.trim().to_string();
        match key.trim() {
            "menu" => target.menu = value,
            "probe" => target.probe = value,
            "host" => target.host = value,
            "lookup" => target.lookup = value,
            "server" => target.server = value,
            _ => {}
        }
    }
    targets.extend(current);

    Ok(targets)
}

/// Read a SmokePing `Targets` document and build one probe entry per target.
///
/// Targets without a `menu` or `host` are skipped with a warning.
pub fn convert_targets(reader: impl BufRead) -> std::io::Result<Vec<ProbeConfig>> {
    let probes = parse_targets(reader)?
        .into_iter()
        .filter(|target| {
            let usable = !target.menu.is_empty() && !target.host.is_empty();
            if !usable {
                warn!(menu = %target.menu, host = %target.host, "Skipping incomplete target");
            }
            usable
        })
        .map(Target::into_probe)
        .collect();

    Ok(probes)
}

#[derive(Serialize)]
struct ProbeDocument<'a> {
    probes: &'a [ProbeConfig],
}

/// Render probe entries as a TOML document of `[[probes]]` tables.
pub fn render_probes(probes: &[ProbeConfig]) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&ProbeDocument { probes })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGETS: &str = "\
*** Targets ***
probe = FPing
menu = Top

+ Network
menu = Network

++ gateway
menu = Gateway
host = 192.0.2.1

++ quad9
menu = Quad9 DNS
probe = DNS
host = dns.quad9.net
lookup = example.com
server = 9.9.9.9

++ local-dns
menu = Local DNS
probe = dns
host = 192.0.2.53:5353

++ orphan
probe = DNS
";

    fn converted() -> Vec<ProbeConfig> {
        convert_targets(TARGETS.as_bytes()).unwrap()
    }

    #[test]
    fn test_plain_target_becomes_ping() {
        let probes = converted();
        let gw = &probes[0];

        assert_eq!(gw.name, "Gateway");
        assert_eq!(gw.kind, "ping");
        assert_eq!(gw.target, "192.0.2.1");
        assert_eq!(gw.interval, Duration::from_secs(5));
        assert!(gw.options.is_empty());
    }

    #[test]
    fn test_dns_target_uses_lookup_and_server() {
        let probes = converted();
        let quad9 = &probes[1];

        assert_eq!(quad9.kind, "dns");
        assert_eq!(quad9.target, "example.com");
        assert_eq!(quad9.options["resolver"].as_str(), Some("9.9.9.9:53"));
    }

    #[test]
    fn test_dns_target_falls_back_to_host() {
        let probes = converted();
        let local = &probes[2];

        assert_eq!(local.kind, "dns");
        assert_eq!(local.target, "192.0.2.53:5353");
        assert_eq!(local.options["resolver"].as_str(), Some("192.0.2.53:5353"));
    }

    #[test]
    fn test_header_lines_and_incomplete_targets_are_ignored() {
        let probes = converted();
        let names: Vec<&str> = probes.iter().map(|p| p.name.as_str()).collect();

        assert_eq!(names, ["Gateway", "Quad9 DNS", "Local DNS"]);
    }

    #[test]
    fn test_rendered_document_parses_back() {
        let probes = converted();
        let rendered = render_probes(&probes).unwrap();

        assert!(rendered.contains("[[probes]]"));
        let back = crate::config::Config::parse(&rendered).unwrap();
        assert_eq!(back.pipeline.probes, probes);
    }
}
