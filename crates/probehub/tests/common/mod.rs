//! Synthetic probes and in-memory outputs shared by the integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use probehub::{
    CancellationToken, Measurement, MeasurementSink, Output, OutputConfig, PluginError, Probe,
    ProbeConfig, Registry, run_every,
};
use serde::Deserialize;

fn default_latency() -> f64 {
    12.5
}

#[derive(Debug, Deserialize)]
struct SyntheticOptions {
    /// Every cycle fails when set.
    #[serde(default)]
    fail: bool,
    #[serde(default = "default_latency")]
    latency_ms: f64,
}

#[derive(Debug, Deserialize)]
struct SlowOptions {
    delay_ms: u64,
}

/// Probe whose check always succeeds (or always fails).
pub struct SyntheticProbe {
    name: String,
    interval: Duration,
    fail: bool,
    latency_ms: f64,
}

impl SyntheticProbe {
    pub fn from_config(cfg: &ProbeConfig) -> Result<Self, PluginError> {
        let opts: SyntheticOptions = cfg.options()?;
        Ok(Self {
            name: cfg.name.clone(),
            interval: cfg.interval,
            fail: opts.fail,
            latency_ms: opts.latency_ms,
        })
    }

    async fn check(&self) -> Vec<Measurement> {
        if self.fail {
            vec![Measurement::failed(&self.name)]
        } else {
            vec![Measurement::new(&self.name, self.latency_ms)]
        }
    }
}

#[async_trait::async_trait]
impl Probe for SyntheticProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, cancel: CancellationToken, sink: MeasurementSink) {
        run_every(self.interval, &cancel, &sink, || self.check()).await;
    }
}

/// Probe that never looks at its cancellation token.
pub struct StubbornProbe {
    name: String,
}

#[async_trait::async_trait]
impl Probe for StubbornProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(1)
    }

    async fn run(&self, _cancel: CancellationToken, _sink: MeasurementSink) {
        loop {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
    }
}

/// Probe emitting `seq-0`, `seq-1`, ... and counting every accepted emit.
pub struct SequenceProbe {
    name: String,
    interval: Duration,
    board: Arc<Board>,
}

#[async_trait::async_trait]
impl Probe for SequenceProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, cancel: CancellationToken, sink: MeasurementSink) {
        let mut ticker = tokio::time::interval(self.interval);
        for seq in 0u64.. {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                sent = sink.emit(Measurement::new(format!("seq-{seq}"), 1.0)) => {
                    if sent.is_err() {
                        return;
                    }
                    self.board.emitted.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    }
}

/// Everything the in-memory outputs observed, across all of them.
#[derive(Debug, Default)]
pub struct Board {
    deliveries: Mutex<Vec<(String, Measurement)>>,
    starts: Mutex<Vec<String>>,
    stops: Mutex<Vec<String>>,
    late_sends: AtomicUsize,
    emitted: AtomicUsize,
    max_lead: AtomicUsize,
}

impl Board {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `(output name, measurement)` in delivery order.
    pub fn deliveries(&self) -> Vec<(String, Measurement)> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn received_by(&self, output: &str) -> Vec<Measurement> {
        self.deliveries()
            .into_iter()
            .filter(|(name, _)| name == output)
            .map(|(_, m)| m)
            .collect()
    }

    pub fn starts(&self) -> Vec<String> {
        self.starts.lock().unwrap().clone()
    }

    pub fn stops(&self) -> Vec<String> {
        self.stops.lock().unwrap().clone()
    }

    /// Sends that arrived after the output was stopped.
    pub fn late_sends(&self) -> usize {
        self.late_sends.load(Ordering::SeqCst)
    }

    /// Measurements a [`SequenceProbe`] got onto the channel.
    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::SeqCst)
    }

    /// Largest gap a [`SlowOutput`] saw between emitted and handed-out
    /// measurements.
    pub fn max_lead(&self) -> usize {
        self.max_lead.load(Ordering::SeqCst)
    }
}

/// Output that appends everything it receives to a [`Board`].
pub struct MemoryOutput {
    name: String,
    board: Arc<Board>,
    stopped: AtomicBool,
    fail_start: bool,
}

impl MemoryOutput {
    pub fn new(name: impl Into<String>, board: Arc<Board>) -> Self {
        Self { name: name.into(), board, stopped: AtomicBool::new(false), fail_start: false }
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }
}

#[async_trait::async_trait]
impl Output for MemoryOutput {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self) -> Result<(), PluginError> {
        self.board.starts.lock().unwrap().push(self.name.clone());
        if self.fail_start {
            return Err(PluginError::Unavailable("listener address in use".into()));
        }
        Ok(())
    }

    async fn send(&self, measurement: &Measurement) {
        if self.stopped.load(Ordering::SeqCst) {
            self.board.late_sends.fetch_add(1, Ordering::SeqCst);
        }
        self.board.deliveries.lock().unwrap().push((self.name.clone(), measurement.clone()));
    }

    async fn stop(&mut self) -> Result<(), PluginError> {
        self.stopped.store(true, Ordering::SeqCst);
        self.board.stops.lock().unwrap().push(self.name.clone());
        Ok(())
    }
}

/// Output whose `send` never completes.
pub struct StuckOutput {
    name: String,
    board: Arc<Board>,
}

#[async_trait::async_trait]
impl Output for StuckOutput {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, _measurement: &Measurement) {
        std::future::pending::<()>().await;
    }

    async fn stop(&mut self) -> Result<(), PluginError> {
        self.board.stops.lock().unwrap().push(self.name.clone());
        Ok(())
    }
}

/// Output whose `send` takes `delay` to complete.
pub struct SlowOutput {
    name: String,
    board: Arc<Board>,
    delay: Duration,
}

#[async_trait::async_trait]
impl Output for SlowOutput {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, measurement: &Measurement) {
        let handed_out = {
            let mut deliveries = self.board.deliveries.lock().unwrap();
            deliveries.push((self.name.clone(), measurement.clone()));
            deliveries.len()
        };
        let lead = self.board.emitted().saturating_sub(handed_out);
        self.board.max_lead.fetch_max(lead, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
    }

    async fn stop(&mut self) -> Result<(), PluginError> {
        self.board.stops.lock().unwrap().push(self.name.clone());
        Ok(())
    }
}

/// Registry with every synthetic plugin, all reporting into `board`.
///
/// Probe types: `synthetic`, `broken`, `stubborn`, `sequence`.
/// Output types: `memory`, `flaky-start`, `stuck`, `slow`, `broken`.
/// `slow` takes its send delay in milliseconds from the `delay_ms` option.
pub fn synthetic_registry(board: &Arc<Board>) -> Registry {
    let mut registry = Registry::new();

    registry
        .register_probe("synthetic", |cfg| Ok(Box::new(SyntheticProbe::from_config(cfg)?) as Box<dyn Probe>))
        .register_probe("broken", |_| Err(PluginError::Unavailable("mtr not found in PATH".into())))
        .register_probe("stubborn", |cfg| {
            Ok(Box::new(StubbornProbe { name: cfg.name.clone() }) as Box<dyn Probe>)
        });

    let sequence_board = Arc::clone(board);
    registry.register_probe("sequence", move |cfg| {
        Ok(Box::new(SequenceProbe {
            name: cfg.name.clone(),
            interval: cfg.interval,
            board: Arc::clone(&sequence_board),
        }) as Box<dyn Probe>)
    });

    let memory_board = Arc::clone(board);
    let flaky_board = Arc::clone(board);
    let stuck_board = Arc::clone(board);
    let slow_board = Arc::clone(board);
    registry
        .register_output("memory", move |cfg| {
            Ok(Box::new(MemoryOutput::new(cfg.name.clone(), Arc::clone(&memory_board))) as Box<dyn Output>)
        })
        .register_output("flaky-start", move |cfg| {
            Ok(Box::new(MemoryOutput::new(cfg.name.clone(), Arc::clone(&flaky_board)).failing_start())
                as Box<dyn Output>)
        })
        .register_output("stuck", move |cfg| {
            Ok(Box::new(StuckOutput { name: cfg.name.clone(), board: Arc::clone(&stuck_board) })
                as Box<dyn Output>)
        })
        .register_output("slow", move |cfg| {
            let opts: SlowOptions = cfg.options()?;
            Ok(Box::new(SlowOutput {
                name: cfg.name.clone(),
                board: Arc::clone(&slow_board),
                delay: Duration::from_millis(opts.delay_ms),
            }) as Box<dyn Output>)
        })
        .register_output("broken", |_| Err(PluginError::config("missing `path`")));

    registry
}

pub fn synthetic_probe(name: &str, interval: Duration) -> ProbeConfig {
    ProbeConfig::new(name, "synthetic", "synthetic.invalid").with_interval(interval)
}

pub fn failing_probe(name: &str, interval: Duration) -> ProbeConfig {
    synthetic_probe(name, interval).with_option("fail", true)
}

pub fn memory_output(name: &str) -> OutputConfig {
    OutputConfig::new(name, "memory")
}
