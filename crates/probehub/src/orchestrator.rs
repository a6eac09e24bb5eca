//! Orchestrator - owns the measurement channel and the dispatch loop.
//!
//! Lifecycle of one [`Orchestrator::run`]:
//!
//! 1. **Bootstrapping**: build every configured output through the registry
//!    and start it. An output that fails to build is skipped; one that fails
//!    to start is logged and stays in the dispatch set.
//! 2. **Running**: build every configured probe (failures are skipped), spawn
//!    one task per probe, then fan each received measurement out to all
//!    outputs in declaration order.
//! 3. **Stopping**: stop draining, wait for probe tasks (bounded by the
//!    shutdown grace), then stop each output exactly once.
//! 4. **Terminated**: `run` returns a [`RunReport`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::OrchestratorError;
use crate::measurement::{Measurement, MeasurementSink};
use crate::plugin::Output;
use crate::registry::Registry;

/// Where an orchestrator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Bootstrapping,
    Running,
    Stopping,
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Bootstrapping => write!(f, "bootstrapping"),
            Phase::Running => write!(f, "running"),
            Phase::Stopping => write!(f, "stopping"),
            Phase::Terminated => write!(f, "terminated"),
        }
    }
}

/// Summary returned once the orchestrator has fully stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Outputs that constructed and received measurements.
    pub outputs_active: usize,
    /// Probes that constructed and were launched.
    pub probes_running: usize,
    /// Measurements fanned out to the outputs.
    pub dispatched: u64,
    /// Probe tasks that ignored cancellation and had to be aborted.
    pub probes_aborted: usize,
}

/// Cloneable trigger for stopping an orchestrator from outside its run loop.
#[derive(Debug, Clone)]
pub struct StopHandle {
    cancel: CancellationToken,
}

impl StopHandle {
    /// Request shutdown. Calling it more than once has no further effect.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// An output that made it through construction, labelled by its config name.
struct ActiveOutput {
    name: String,
    inner: Box<dyn Output>,
}

/// Pipeline coordinator: registry lookups in, fan-out dispatch loop out.
pub struct Orchestrator {
    config: PipelineConfig,
    registry: Arc<Registry>,
    cancel: CancellationToken,
    phase_tx: watch::Sender<Phase>,
}

impl Orchestrator {
    /// Create an orchestrator. Nothing is constructed until [`run`](Self::run).
    pub fn new(config: PipelineConfig, registry: Arc<Registry>) -> Result<Self, OrchestratorError> {
        config.validate()?;
        let (phase_tx, _) = watch::channel(Phase::Idle);

        Ok(Self { config, registry, cancel: CancellationToken::new(), phase_tx })
    }

    /// Request shutdown; idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Handle that can stop this orchestrator after it was moved into a task.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle { cancel: self.cancel.clone() }
    }

    /// Subscribe to lifecycle transitions.
    pub fn phase(&self) -> watch::Receiver<Phase> {
        self.phase_tx.subscribe()
    }

    /// Run the pipeline until `outer` fires or [`stop`](Self::stop) is called.
    ///
    /// Returns only after every probe task has exited (or was aborted after
    /// the shutdown grace) and every active output was stopped.
    ///
    /// With `send_timeout` set, a measurement being fanned out when shutdown
    /// starts still reaches every output. Without it, shutdown interrupts the
    /// fan-out, so that last measurement may reach only the first outputs.
    pub async fn run(self, outer: CancellationToken) -> RunReport {
        let cancel = self.cancel.clone();
        let link = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::select! {
                    _ = outer.cancelled() => {
                        debug!("Outer cancellation received");
                        cancel.cancel();
                    }
                    _ = cancel.cancelled() => {}
                }
            }
        });

        self.set_phase(Phase::Bootstrapping);
        let mut outputs = self.start_outputs().await;

        let (tx, mut rx) = mpsc::channel(self.config.dispatch.channel_capacity);
        let mut probes = self.spawn_probes(&tx);
        drop(tx);

        let mut report = RunReport {
            outputs_active: outputs.len(),
            probes_running: probes.len(),
            ..RunReport::default()
        };
        info!(
            outputs = report.outputs_active,
            probes = report.probes_running,
            "Orchestrator started - dispatching measurements"
        );
        self.set_phase(Phase::Running);

        report.dispatched = self.dispatch(&mut rx, &mut probes, &outputs).await;

        self.set_phase(Phase::Stopping);
        info!("Stopping orchestrator...");
        // Unblocks probes waiting on a full channel.
        drop(rx);
        report.probes_aborted = join_probes(&mut probes, self.config.dispatch.shutdown_grace).await;

        for output in &mut outputs {
            match output.inner.stop().await {
                Ok(()) => debug!(output = %output.name, "Output stopped"),
                Err(e) => error!(output = %output.name, error = %e, "Output failed to stop cleanly"),
            }
        }

        link.abort();
        self.set_phase(Phase::Terminated);
        info!(dispatched = report.dispatched, "Orchestrator stopped");
        report
    }

    // --- Private helpers ---

    fn set_phase(&self, phase: Phase) {
        debug!(%phase, "Orchestrator phase change");
        self.phase_tx.send_replace(phase);
    }

    async fn start_outputs(&self) -> Vec<ActiveOutput> {
        let mut outputs = Vec::with_capacity(self.config.outputs.len());

        for cfg in &self.config.outputs {
            let mut inner = match self.registry.create_output(cfg) {
                Ok(output) => output,
                Err(e) => {
                    warn!(output = %cfg.name, error = %e, "Output failed to register; skipping");
                    continue;
                }
            };

            info!(output = %cfg.name, kind = %cfg.kind, "Starting output");
            if let Err(e) = inner.start().await {
                error!(output = %cfg.name, error = %e, "Output start failed; keeping it in the dispatch set");
            }
            outputs.push(ActiveOutput { name: cfg.name.clone(), inner });
        }

        outputs
    }

    fn spawn_probes(&self, tx: &mpsc::Sender<Measurement>) -> JoinSet<String> {
        let mut probes = JoinSet::new();

        for cfg in &self.config.probes {
            let probe = match self.registry.create_probe(cfg) {
                Ok(probe) => probe,
                Err(e) => {
                    warn!(probe = %cfg.name, error = %e, "Probe failed to register; skipping");
                    continue;
                }
            };

            info!(
                probe = %probe.name(),
                kind = %cfg.kind,
                target = %cfg.target,
                interval = ?probe.interval(),
                "Loaded probe"
            );

            let token = self.cancel.child_token();
            let sink = MeasurementSink::new(tx.clone());
            let name = cfg.name.clone();
            probes.spawn(async move {
                probe.run(token, sink).await;
                name
            });
        }

        probes
    }

    async fn dispatch(
        &self,
        rx: &mut mpsc::Receiver<Measurement>,
        probes: &mut JoinSet<String>,
        outputs: &[ActiveOutput],
    ) -> u64 {
        let send_timeout = self.config.dispatch.send_timeout;
        let mut dispatched = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Some(measurement) if send_timeout.is_some() => {
                        // Every send is bounded, so the round ends promptly.
                        fan_out(&measurement, outputs, send_timeout).await;
                        dispatched += 1;
                    }
                    Some(measurement) => {
                        // A hung send must not also hang shutdown.
                        tokio::select! {
                            biased;
                            _ = self.cancel.cancelled() => {
                                warn!(source = %measurement.source(), "Shutdown interrupted an in-flight dispatch");
                                break;
                            }
                            _ = fan_out(&measurement, outputs, send_timeout) => dispatched += 1,
                        }
                    }
                    None => {
                        debug!("All probes have exited; waiting for cancellation");
                        self.cancel.cancelled().await;
                        break;
                    }
                },
                Some(joined) = probes.join_next(), if !probes.is_empty() => {
                    match joined {
                        Ok(name) => warn!(probe = %name, "Probe exited before shutdown"),
                        Err(e) => error!(error = %e, "Probe task failed"),
                    }
                }
            }
        }

        dispatched
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("probes", &self.config.probes.len())
            .field("outputs", &self.config.outputs.len())
            .field("phase", &*self.phase_tx.borrow())
            .finish_non_exhaustive()
    }
}

/// Hand one measurement to every output, in order, before returning.
async fn fan_out(measurement: &Measurement, outputs: &[ActiveOutput], send_timeout: Option<Duration>) {
    for output in outputs {
        match send_timeout {
            None => output.inner.send(measurement).await,
            Some(limit) => {
                if tokio::time::timeout(limit, output.inner.send(measurement)).await.is_err() {
                    warn!(
                        output = %output.name,
                        source = %measurement.source(),
                        timeout = ?limit,
                        "Output send timed out; measurement dropped for this output"
                    );
                }
            }
        }
    }
}

/// Wait for probe tasks to finish; abort whatever is left after `grace`.
/// Returns how many had to be aborted.
async fn join_probes(probes: &mut JoinSet<String>, grace: Duration) -> usize {
    let drained = tokio::time::timeout(grace, async {
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(name) => debug!(probe = %name, "Probe exited"),
                Err(e) => error!(error = %e, "Probe task failed"),
            }
        }
    })
    .await;

    if drained.is_ok() {
        return 0;
    }

    let remaining = probes.len();
    warn!(remaining, grace = ?grace, "Probes ignored cancellation; aborting");
    probes.shutdown().await;
    remaining
}
