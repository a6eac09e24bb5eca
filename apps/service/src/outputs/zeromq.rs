use std::sync::Mutex;

use probehub::{Measurement, Output, OutputConfig, PluginError};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct ZmqOptions {
    /// Endpoint to bind, e.g. `tcp://*:5556`.
    listen: String,
}

/// Publishes every measurement as JSON on a ZeroMQ PUB socket.
pub struct ZmqOutput {
    name: String,
    /// Bound endpoint, with any wildcard port resolved.
    endpoint: String,
    // zmq sockets are Send but not Sync.
    socket: Mutex<Option<zmq::Socket>>,
}

impl ZmqOutput {
    /// Creates the PUB socket and binds it right away.
    pub fn from_config(cfg: &OutputConfig) -> Result<Self, PluginError> {
        let opts: ZmqOptions = cfg.options()?;

        let context = zmq::Context::new();
        let socket = context.socket(zmq::PUB).map_err(PluginError::backend)?;
        socket.bind(&opts.listen).map_err(|e| PluginError::backend(format!("bind {}: {e}", opts.listen)))?;

        let endpoint = match socket.get_last_endpoint() {
            Ok(Ok(endpoint)) => endpoint,
            _ => opts.listen,
        };
        info!(output = %cfg.name, %endpoint, "ZeroMQ publisher bound");

        Ok(Self { name: cfg.name.clone(), endpoint, socket: Mutex::new(Some(socket)) })
    }
}

#[async_trait::async_trait]
impl Output for ZmqOutput {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, measurement: &Measurement) {
        let payload = match serde_json::to_vec(measurement) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(output = %self.name, error = %e, "Failed to encode measurement");
                return;
            }
        };

        let guard = match self.socket.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(socket) = guard.as_ref() else {
            debug!(output = %self.name, "Send after stop ignored");
            return;
        };
        if let Err(e) = socket.send(payload, zmq::DONTWAIT) {
            warn!(output = %self.name, error = %e, "ZeroMQ publish failed");
        }
    }

    async fn stop(&mut self) -> Result<(), PluginError> {
        let socket = match self.socket.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(socket) = socket {
            // Pending messages are dropped with the socket.
            socket.set_linger(0).map_err(PluginError::backend)?;
            debug!(output = %self.name, endpoint = %self.endpoint, "ZeroMQ publisher closed");
        }
        Ok(())
    }
}
