use std::fmt;
use std::io::Error as IoError;

use thiserror::Error;

/// Which plugin table a lookup went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Probe,
    Output,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Probe => write!(f, "probe"),
            Capability::Output => write!(f, "output"),
        }
    }
}

/// Errors raised by plugin constructors and by output `start`/`stop`.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A type-specific option is missing or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{0:#}")]
    Io(#[from] IoError),
    /// Something the plugin needs on the host is missing (binary, privilege).
    #[error("unavailable: {0}")]
    Unavailable(String),
    /// Failure reported by the plugin's backend library.
    #[error("backend error: {0}")]
    Backend(String),
}

impl PluginError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn backend(err: impl fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Errors returned by [`Registry`](crate::Registry) lookups.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No constructor is registered under the requested type name.
    #[error("unknown {capability} type: {type_name}")]
    UnknownType { capability: Capability, type_name: String },

    /// The entry is unusable whatever its type; no constructor runs.
    #[error("{capability} {name:?} is invalid: {reason}")]
    InvalidEntry { capability: Capability, name: String, reason: &'static str },

    /// The constructor ran and refused the configuration.
    #[error("{capability} {name:?} (type={type_name}) failed to construct: {source}")]
    Construct {
        capability: Capability,
        name: String,
        type_name: String,
        #[source]
        source: PluginError,
    },
}

impl RegistryError {
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, RegistryError::UnknownType { .. })
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid dispatch settings: {0}")]
    InvalidSettings(String),
}
