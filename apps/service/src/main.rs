#![warn(clippy::all)]

use std::fs::{self, File};
use std::io::BufReader;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::level_filters::LevelFilter;

mod cli;
mod config;
mod convert;
mod daemon;
mod outputs;
mod pidfile;
mod plugins;
mod probes;

use cli::{Cli, Command};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    logger::init(if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO });

    match cli.command {
        Command::Start { daemonize, pid_file } => {
            if daemonize && !daemon::is_detached() {
                let pid = daemon::spawn_detached()?;
                println!("tickprobe daemon started, PID {pid}");
                return Ok(());
            }

            let config = Config::load(cli.config.as_deref())?;
            daemon::run(config, pid_file).await?;
        }
        Command::Check => check(&Config::load(cli.config.as_deref())?)?,
        Command::Plugins => list_plugins(),
        Command::ConvertTargets { input, output } => {
            let file = File::open(&input).with_context(|| format!("opening {}", input.display()))?;
            let probes = convert::convert_targets(BufReader::new(file))
                .with_context(|| format!("reading {}", input.display()))?;
            let rendered = convert::render_probes(&probes)?;

            match output {
                Some(path) => {
                    fs::write(&path, rendered).with_context(|| format!("writing {}", path.display()))?;
                    println!("Generated {} ({} probes)", path.display(), probes.len());
                }
                None => print!("{rendered}"),
            }
        }
    }

    Ok(())
}

fn check(config: &Config) -> Result<()> {
    print!("{config}");
    config.pipeline.validate()?;

    let problems = plugins::entry_problems(&config.pipeline, &plugins::registry());
    for err in &problems {
        println!("  {err}");
    }
    if !problems.is_empty() {
        bail!("{} entries would be skipped", problems.len());
    }

    println!("Configuration OK");
    Ok(())
}

fn list_plugins() {
    let registry = plugins::registry();

    println!("Probe types:");
    for name in registry.probe_types() {
        println!("  {name}");
    }
    println!("Output types:");
    for name in registry.output_types() {
        println!("  {name}");
    }
}
