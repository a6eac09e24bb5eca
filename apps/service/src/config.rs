use std::path::{Path, PathBuf};
use std::{env, fmt, fs, io};

use probehub::{DispatchSettings, PipelineConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file {} does not exist", .0.display())]
    Missing(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse {}: {source}", path.display())]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("no configuration directory available (set XDG_CONFIG_HOME or HOME)")]
    PathUnavailable,
}

/// Daemon configuration: process settings plus the pipeline handed to the
/// orchestrator.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Written with the daemon's PID on start, removed on exit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid_file: Option<PathBuf>,
    #[serde(flatten)]
    pub pipeline: PipelineConfig,
}

/// Get default config path ($XDG_CONFIG_HOME/tickprobe/config.toml or
/// $HOME/.config/...)
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::PathUnavailable);
    };

    Ok(path.join("tickprobe/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        let DispatchSettings { channel_capacity, shutdown_grace, send_timeout } =
            &self.pipeline.dispatch;

        writeln!(f, "Current Configuration:")?;
        match &self.pid_file {
            Some(path) => write_1(f, "PID File", &path.display())?,
            None => write_1(f, "PID File", &"(none)")?,
        }

        write_title_1(f, "Dispatch")?;
        write_1(f, "Channel Capacity", channel_capacity)?;
        write_1(f, "Shutdown Grace", &format_args!("{shutdown_grace:?}"))?;
        match send_timeout {
            Some(limit) => write_1(f, "Send Timeout", &format_args!("{limit:?}"))?,
            None => write_1(f, "Send Timeout", &"unbounded")?,
        }

        write_title_1(f, "Probes")?;
        for probe in &self.pipeline.probes {
            write_1(f, &probe.name, &format_args!("type={} target={}", probe.kind, probe.target))?;
            write_2(f, "Interval", &format_args!("{:?}", probe.interval))?;
            for (key, value) in &probe.options {
                write_2(f, key, value)?;
            }
        }

        write_title_1(f, "Outputs")?;
        for output in &self.pipeline.outputs {
            write_1(f, &output.name, &format_args!("type={}", output.kind))?;
            for (key, value) in &output.options {
                write_2(f, key, value)?;
            }
        }

        Ok(())
    }
}

impl Config {
    /// Load the configuration file.
    ///
    /// An explicit path must exist. Without one the default path is used,
    /// and a default document is written there first if it is missing.
    ///
    /// ```rust,ignore
    /// let cfg = config::Config::load(None)?;
    /// println!("{cfg}");
    /// ```
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) if !path.exists() => Err(ConfigError::Missing(path.to_path_buf())),
            Some(path) => Self::read(path),
            None => Self::load_or_create(&default_config_path()?),
        }
    }

    fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::read(path)
        } else {
            let config = Self::default();
            config.write_config(path)?;
            Ok(config)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::parse(&raw).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &Path) -> Result<(), ConfigError> {
        let config_str = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::Write { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str)
            .map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })
    }
}
