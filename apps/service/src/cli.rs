use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Realtime latency measurement daemon
#[derive(Debug, Parser)]
#[command(name = "tickprobe", version, about)]
pub struct Cli {
    /// Configuration file (defaults to $XDG_CONFIG_HOME/tickprobe/config.toml)
    #[arg(short, long, global = true, env = "TICKPROBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the daemon
    Start {
        /// Run in the background, detached from the terminal
        #[arg(short, long)]
        daemonize: bool,

        /// Write the process id here (overrides `pid_file` in the config)
        #[arg(long, env = "TICKPROBE_PID_FILE")]
        pid_file: Option<PathBuf>,
    },
    /// Validate the configuration and report entries that would be skipped
    Check,
    /// List the registered probe and output types
    Plugins,
    /// Convert a SmokePing Targets file into [[probes]] entries
    ConvertTargets {
        /// SmokePing Targets file
        input: PathBuf,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_start_flags() {
        let cli = Cli::try_parse_from(["tickprobe", "-c", "/etc/tickprobe.toml", "start", "-d"]).unwrap();

        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/etc/tickprobe.toml")));
        assert!(matches!(cli.command, Command::Start { daemonize: true, .. }));
    }

    #[test]
    fn test_convert_targets_args() {
        let cli = Cli::try_parse_from(["tickprobe", "convert-targets", "Targets", "-o", "probes.toml"]).unwrap();

        match cli.command {
            Command::ConvertTargets { input, output } => {
                assert_eq!(input, PathBuf::from("Targets"));
                assert_eq!(output, Some(PathBuf::from("probes.toml")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
