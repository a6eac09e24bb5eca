//! Live view: an HTTP server for the static UI plus a `/ws` feed.
//!
//! Every measurement is broadcast to all connected WebSocket clients as a
//! JSON text frame. Clients that fall behind skip what they missed.

use std::path::PathBuf;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use probehub::{CancellationToken, Measurement, Output, OutputConfig, PluginError};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tracing::{debug, error, info, warn};

const CLIENT_BUFFER: usize = 256;
const SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

fn default_static_dir() -> PathBuf {
    PathBuf::from("web/static")
}

#[derive(Debug, Deserialize)]
struct WsOptions {
    listen: String,
    #[serde(default = "default_static_dir")]
    static_dir: PathBuf,
}

#[derive(Clone)]
struct FeedState {
    feed: broadcast::Sender<String>,
    shutdown: CancellationToken,
}

pub struct WsOutput {
    name: String,
    listen: String,
    static_dir: PathBuf,
    state: FeedState,
    server: Option<JoinHandle<()>>,
}

impl WsOutput {
    pub fn from_config(cfg: &OutputConfig) -> Result<Self, PluginError> {
        let opts: WsOptions = cfg.options()?;
        let (feed, _) = broadcast::channel(CLIENT_BUFFER);

        Ok(Self {
            name: cfg.name.clone(),
            listen: opts.listen,
            static_dir: opts.static_dir,
            state: FeedState { feed, shutdown: CancellationToken::new() },
            server: None,
        })
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .fallback_service(ServeDir::new(&self.static_dir))
            .with_state(self.state.clone())
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<FeedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| client_loop(socket, state))
}

/// Forward the feed to one client until it leaves or the server shuts down.
async fn client_loop(mut socket: WebSocket, state: FeedState) {
    let mut feed = state.feed.subscribe();
    debug!("WebSocket client connected");

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            next = feed.recv() => match next {
                Ok(text) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "WebSocket client lagging"),
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("WebSocket client disconnected");
}

#[async_trait::async_trait]
impl Output for WsOutput {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&mut self) -> Result<(), PluginError> {
        let listener = TcpListener::bind(&self.listen).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let shutdown = self.state.shutdown.clone();
        let name = self.name.clone();

        info!(output = %self.name, %addr, static_dir = %self.static_dir.display(), "HTTP/ws server listening");
        self.server = Some(tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(output = %name, error = %e, "HTTP server error");
            }
        }));

        Ok(())
    }

    async fn send(&self, measurement: &Measurement) {
        let text = match serde_json::to_string(measurement) {
            Ok(text) => text,
            Err(e) => {
                error!(output = %self.name, error = %e, "Failed to encode measurement");
                return;
            }
        };
        // No subscribers is not an error.
        let _ = self.state.feed.send(text);
    }

    async fn stop(&mut self) -> Result<(), PluginError> {
        self.state.shutdown.cancel();

        if let Some(server) = self.server.take() {
            match tokio::time::timeout(SHUTDOWN_WAIT, server).await {
                Ok(Ok(())) => debug!(output = %self.name, "HTTP server stopped"),
                Ok(Err(e)) => return Err(PluginError::backend(e)),
                Err(_) => warn!(output = %self.name, "HTTP server did not stop in time"),
            }
        }
        Ok(())
    }
}
