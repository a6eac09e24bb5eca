use probehub::{PipelineConfig, Registry, RegistryError};

use crate::{outputs, probes};

/// Register every probe and output type this binary ships.
pub fn register_all(registry: &mut Registry) {
    probes::register(registry);
    outputs::register(registry);
}

/// A registry holding every built-in plugin.
pub fn registry() -> Registry {
    let mut registry = Registry::new();
    register_all(&mut registry);
    registry
}

/// Entries of `pipeline` the orchestrator would skip before running any
/// constructor: unknown types and entries with no name or a zero interval.
///
/// Nothing is constructed, so checking has no side effects such as binding
/// listeners.
pub fn entry_problems(pipeline: &PipelineConfig, registry: &Registry) -> Vec<RegistryError> {
    let probes = pipeline.probes.iter().filter_map(|p| registry.check_probe(p).err());
    let outputs = pipeline.outputs.iter().filter_map(|o| registry.check_output(o).err());

    probes.chain(outputs).collect()
}
