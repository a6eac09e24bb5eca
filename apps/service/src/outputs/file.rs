use std::fs::OpenOptions;
use std::path::PathBuf;

use probehub::{Measurement, Output, OutputConfig, PluginError};
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error};

#[derive(Debug, Deserialize)]
struct FileOptions {
    path: PathBuf,
}

/// Appends `timestamp,source,value` lines to a file.
pub struct FileOutput {
    name: String,
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileOutput {
    /// Opens (creating if needed) the file in append mode.
    pub fn from_config(cfg: &OutputConfig) -> Result<Self, PluginError> {
        let opts: FileOptions = cfg.options()?;
        let file = OpenOptions::new().create(true).append(true).open(&opts.path)?;

        Ok(Self { name: cfg.name.clone(), path: opts.path, file: Mutex::new(Some(File::from_std(file))) })
    }
}

fn format_line(m: &Measurement) -> String {
    format!("{},{},{:.3}\n", m.timestamp(), m.source(), m.value())
}

#[async_trait::async_trait]
impl Output for FileOutput {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, measurement: &Measurement) {
        let mut guard = self.file.lock().await;
        let Some(file) = guard.as_mut() else {
            debug!(output = %self.name, "Send after stop ignored");
            return;
        };

        if let Err(e) = file.write_all(format_line(measurement).as_bytes()).await {
            error!(output = %self.name, path = %self.path.display(), error = %e, "Failed to append measurement");
        }
    }

    async fn stop(&mut self) -> Result<(), PluginError> {
        if let Some(mut file) = self.file.get_mut().take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}
