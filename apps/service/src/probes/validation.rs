use std::net::IpAddr;
use std::time::Duration;

use probehub::PluginError;
use url::Url;

/// Validation results with specific error messages
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self { is_valid: true, error: None }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { is_valid: false, error: Some(msg.into()) }
    }

    /// Turn a failed validation into a constructor error for `probe`.
    pub fn into_result(self, probe: &str) -> Result<(), PluginError> {
        match self.error {
            Some(msg) if !self.is_valid => Err(PluginError::config(format!("{probe}: {msg}"))),
            None if !self.is_valid => Err(PluginError::config(format!("{probe}: validation failed"))),
            _ => Ok(()),
        }
    }
}

/// Validate HTTP/HTTPS URL endpoint
pub fn validate_http_endpoint(target: &str) -> ValidationResult {
    if target.trim().is_empty() {
        return ValidationResult::err("Target cannot be empty");
    }

    match Url::parse(target) {
        Ok(url) => {
            let scheme = url.scheme();
            if scheme != "http" && scheme != "https" {
                return ValidationResult::err(format!(
                    "Invalid scheme '{scheme}'. Must be http or https"
                ));
            }

            if url.host_str().is_none() {
                return ValidationResult::err("URL must have a valid host");
            }

            ValidationResult::ok()
        }
        Err(e) => {
            if !target.contains("://") {
                ValidationResult::err("URL must include scheme (http:// or https://)")
            } else {
                ValidationResult::err(format!("Invalid URL: {e}"))
            }
        }
    }
}

/// Validate a `host:port` endpoint (IPv6 hosts in brackets). Nothing is
/// resolved here; resolution happens on every cycle.
pub fn validate_socket_endpoint(target: &str) -> ValidationResult {
    if target.trim().is_empty() {
        return ValidationResult::err("Target cannot be empty");
    }

    let Some((host, port)) = target.rsplit_once(':') else {
        return ValidationResult::err("Target must be in format 'host:port'");
    };

    let host = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
    if host.is_empty() || (host.contains(':') && host.parse::<IpAddr>().is_err()) {
        return ValidationResult::err("Target must be in format 'host:port'");
    }

    match port.parse::<u16>() {
        Ok(port) if port > 0 => ValidationResult::ok(),
        Ok(_) => ValidationResult::err("Port must be between 1 and 65535"),
        Err(_) => ValidationResult::err("Invalid port number"),
    }
}

/// Validate a bare host (IP address or hostname)
pub fn validate_host(target: &str) -> ValidationResult {
    if target.trim().is_empty() {
        return ValidationResult::err("Target cannot be empty");
    }

    if target.parse::<IpAddr>().is_ok() {
        return ValidationResult::ok();
    }

    if target.contains(' ') {
        return ValidationResult::err("Target cannot contain spaces");
    }

    if target.starts_with('-') || target.ends_with('-') {
        return ValidationResult::err("Hostname cannot start or end with hyphen");
    }

    if target.chars().all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == '_') {
        ValidationResult::ok()
    } else {
        ValidationResult::err("Invalid hostname. Use IP address or valid hostname")
    }
}

/// A timeout at or above the interval delays every following tick.
pub fn validate_timeout(timeout: Duration, interval: Duration) -> ValidationResult {
    if timeout.is_zero() {
        return ValidationResult::err("Timeout must be greater than zero");
    }

    if timeout >= interval {
        return ValidationResult::err("Timeout should be less than interval");
    }

    ValidationResult::ok()
}
