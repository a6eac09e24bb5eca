//! Type-name to constructor tables for probes and outputs.

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::config::{OutputConfig, ProbeConfig};
use crate::error::{Capability, PluginError, RegistryError};
use crate::plugin::{Output, Probe};

/// Builds a probe from its configuration entry.
pub type ProbeConstructor =
    Box<dyn Fn(&ProbeConfig) -> Result<Box<dyn Probe>, PluginError> + Send + Sync>;

/// Builds an output from its configuration entry.
pub type OutputConstructor =
    Box<dyn Fn(&OutputConfig) -> Result<Box<dyn Output>, PluginError> + Send + Sync>;

/// Plugin tables, filled during start-up and read-only afterwards.
///
/// Registration takes `&mut self` and lookups take `&self`, so once the
/// registry is shared (e.g. behind an `Arc`) it can no longer change.
#[derive(Default)]
pub struct Registry {
    probes: HashMap<String, ProbeConstructor>,
    outputs: HashMap<String, OutputConstructor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a probe constructor. A later registration under the same
    /// name replaces the earlier one.
    pub fn register_probe<F>(&mut self, type_name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&ProbeConfig) -> Result<Box<dyn Probe>, PluginError> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        if self.probes.insert(type_name.clone(), Box::new(constructor)).is_some() {
            debug!(type_name = %type_name, "Replaced probe constructor");
        }
        self
    }

    /// Register an output constructor. Last registration wins.
    pub fn register_output<F>(&mut self, type_name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&OutputConfig) -> Result<Box<dyn Output>, PluginError> + Send + Sync + 'static,
    {
        let type_name = type_name.into();
        if self.outputs.insert(type_name.clone(), Box::new(constructor)).is_some() {
            debug!(type_name = %type_name, "Replaced output constructor");
        }
        self
    }

    /// Instantiate the probe described by `config`.
    ///
    /// # Errors
    /// [`RegistryError::InvalidEntry`] if the entry has no name or a zero
    /// interval, [`RegistryError::UnknownType`] if `config.kind` is not
    /// registered (in both cases no constructor runs), and
    /// [`RegistryError::Construct`] if the constructor fails.
    pub fn create_probe(&self, config: &ProbeConfig) -> Result<Box<dyn Probe>, RegistryError> {
        let constructor = self.probe_constructor(config)?;

        constructor(config).map_err(|source| RegistryError::Construct {
            capability: Capability::Probe,
            name: config.name.clone(),
            type_name: config.kind.clone(),
            source,
        })
    }

    /// Instantiate the output described by `config`.
    pub fn create_output(&self, config: &OutputConfig) -> Result<Box<dyn Output>, RegistryError> {
        let constructor = self.output_constructor(config)?;

        constructor(config).map_err(|source| RegistryError::Construct {
            capability: Capability::Output,
            name: config.name.clone(),
            type_name: config.kind.clone(),
            source,
        })
    }

    /// Everything [`create_probe`](Self::create_probe) checks before it runs
    /// the constructor. Nothing is built.
    pub fn check_probe(&self, config: &ProbeConfig) -> Result<(), RegistryError> {
        self.probe_constructor(config).map(|_| ())
    }

    pub fn check_output(&self, config: &OutputConfig) -> Result<(), RegistryError> {
        self.output_constructor(config).map(|_| ())
    }

    fn probe_constructor(&self, config: &ProbeConfig) -> Result<&ProbeConstructor, RegistryError> {
        if let Some(reason) = config.defect() {
            return Err(RegistryError::InvalidEntry {
                capability: Capability::Probe,
                name: config.name.clone(),
                reason,
            });
        }
        self.probes.get(&config.kind).ok_or_else(|| RegistryError::UnknownType {
            capability: Capability::Probe,
            type_name: config.kind.clone(),
        })
    }

    fn output_constructor(&self, config: &OutputConfig) -> Result<&OutputConstructor, RegistryError> {
        if let Some(reason) = config.defect() {
            return Err(RegistryError::InvalidEntry {
                capability: Capability::Output,
                name: config.name.clone(),
                reason,
            });
        }
        self.outputs.get(&config.kind).ok_or_else(|| RegistryError::UnknownType {
            capability: Capability::Output,
            type_name: config.kind.clone(),
        })
    }

    pub fn has_probe(&self, type_name: &str) -> bool {
        self.probes.contains_key(type_name)
    }

    pub fn has_output(&self, type_name: &str) -> bool {
        self.outputs.contains_key(type_name)
    }

    /// Registered probe type names, sorted.
    pub fn probe_types(&self) -> Vec<&str> {
        sorted_keys(&self.probes)
    }

    /// Registered output type names, sorted.
    pub fn output_types(&self) -> Vec<&str> {
        sorted_keys(&self.outputs)
    }
}

fn sorted_keys<V>(table: &HashMap<String, V>) -> Vec<&str> {
    let mut keys: Vec<&str> = table.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("probes", &self.probe_types())
            .field("outputs", &self.output_types())
            .finish()
    }
}
