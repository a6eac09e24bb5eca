//! probehub - plugin registry and orchestration engine for latency probes
//!
//! Probes measure targets on their own schedule and push [`Measurement`]s onto
//! one shared bounded channel. A single dispatch loop drains that channel and
//! hands every measurement to every configured output, in declaration order.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use probehub::{Orchestrator, PipelineConfig, Registry};
//! use tokio_util::sync::CancellationToken;
//!
//! let mut registry = Registry::new();
//! my_plugins::register_all(&mut registry);
//!
//! let orchestrator = Orchestrator::new(config, Arc::new(registry))?;
//! let shutdown = CancellationToken::new();
//! let report = orchestrator.run(shutdown.clone()).await;
//! ```

pub mod config;
pub mod error;
pub mod measurement;
pub mod orchestrator;
pub mod plugin;
pub mod registry;

pub use config::{DispatchSettings, OutputConfig, PipelineConfig, ProbeConfig};
pub use error::{Capability, OrchestratorError, PluginError, RegistryError};
pub use measurement::{FAILURE_SENTINEL, Measurement, MeasurementSink, SinkClosed};
pub use orchestrator::{Orchestrator, Phase, RunReport, StopHandle};
pub use plugin::{Output, Probe, run_every};
pub use registry::{OutputConstructor, ProbeConstructor, Registry};

/// Re-exported so plugin crates name the same token type as the core.
pub use tokio_util::sync::CancellationToken;
