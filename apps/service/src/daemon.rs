use std::ffi::OsString;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::{env, io};

use anyhow::{Context, Result};
use probehub::{CancellationToken, Orchestrator, RunReport};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::pidfile::PidFile;
use crate::plugins;

/// Set in the environment of a re-executed daemon so it does not detach again.
pub const DETACHED_VAR: &str = "TICKPROBE_DETACHED";

pub fn is_detached() -> bool {
    env::var_os(DETACHED_VAR).is_some()
}

/// Re-execute this binary in its own process group with stdio on
/// `/dev/null`, minus the daemonize flag. Returns the child's PID.
pub fn spawn_detached() -> Result<u32> {
    let exe = env::current_exe().context("locating the running executable")?;
    let args: Vec<OsString> =
        env::args_os().skip(1).filter(|arg| arg != "-d" && arg != "--daemonize").collect();

    let child = Command::new(exe)
        .args(args)
        .env(DETACHED_VAR, "1")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .context("starting the background process")?;

    Ok(child.id())
}

/// Resolves on SIGINT or SIGTERM, whichever comes first.
async fn shutdown_signal() -> io::Result<&'static str> {
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

/// Run the orchestrator until a shutdown signal arrives.
pub async fn run(config: Config, pid_override: Option<PathBuf>) -> Result<RunReport> {
    let _pid_file = match pid_override.or(config.pid_file) {
        Some(path) => match PidFile::create(&path) {
            Ok(pid_file) => {
                info!(path = %pid_file.path().display(), "PID file written");
                Some(pid_file)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to write PID file; continuing");
                None
            }
        },
        None => None,
    };

    let orchestrator = Orchestrator::new(config.pipeline, Arc::new(plugins::registry()))
        .context("invalid pipeline configuration")?;

    let shutdown = CancellationToken::new();
    let signals = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match shutdown_signal().await {
                Ok(name) => info!(signal = name, "Shutdown signal received"),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signals; stopping"),
            }
            shutdown.cancel();
        }
    });

    info!(pid = std::process::id(), "tickprobe started");
    let report = orchestrator.run(shutdown).await;
    signals.abort();

    info!(
        dispatched = report.dispatched,
        probes = report.probes_running,
        outputs = report.outputs_active,
        aborted = report.probes_aborted,
        "tickprobe stopped"
    );
    Ok(report)
}
