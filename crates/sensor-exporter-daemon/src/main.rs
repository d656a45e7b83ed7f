//! Sensor Exporter
//!
//! Serves hardware sensor readings as Prometheus gauges.

mod config;
mod metrics;
mod show;
mod state;
mod web;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use config::Config;
use metrics::SensorsCollector;
use show::OutputFormat;
use state::AppState;

#[derive(Parser)]
#[command(name = "sensor-exporter")]
#[command(about = "Prometheus exporter for hardware sensor readings")]
#[command(version)]
struct Cli {
    /// Configuration file (default: ./sensor-exporter.toml if present)
    #[arg(short, long, global = true, env = "SENSOR_EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve metrics over HTTP
    Start(StartArgs),
    /// Print the current readings and exit
    Show {
        /// Output format
        #[arg(short, long, default_value = "ascii", value_enum)]
        output: OutputFormat,
    },
}

/// Overrides applied on top of the configuration file.
#[derive(Args, Debug, Default)]
struct StartArgs {
    /// Address to listen on
    #[arg(long, env = "SENSOR_EXPORTER_LISTEN")]
    listen: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "SENSOR_EXPORTER_PORT")]
    port: Option<u16>,

    /// Path serving metrics
    #[arg(long, env = "SENSOR_EXPORTER_PATH")]
    path: Option<String>,

    /// Scrape timeout in milliseconds
    #[arg(long, env = "SENSOR_EXPORTER_SCRAPE_TIMEOUT")]
    scrape_timeout: Option<u64>,
}

impl StartArgs {
    fn apply(self, config: &mut Config) {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(path) = self.path {
            config.path = path;
        }
        if let Some(scrape_timeout) = self.scrape_timeout {
            config.scrape_timeout = scrape_timeout;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(cli: Cli) -> Result<()> {
    let (mut config, config_path) = Config::discover(cli.config.as_deref())?;
    match &config_path {
        Some(path) => info!("Loaded configuration from: {}", path.display()),
        None => info!("Using default configuration"),
    }

    match cli.command {
        Commands::Start(args) => {
            args.apply(&mut config);
            start(config).await
        }
        Commands::Show { output } => {
            let source = config.source.build(config.scrape_timeout());
            tokio::task::spawn_blocking(move || show::run(source, output))
                .await
                .context("Show task failed")?
        }
    }
}

async fn start(config: Config) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let source = config.source.build(config.scrape_timeout());
    info!("Reading sensors from {}", source.name());

    let state = AppState::new(
        SensorsCollector::new(source),
        config.scrape_timeout(),
        config.path.clone(),
    )
    .context("Failed to register exporter metrics")?;

    web::serve(&config, Arc::new(state)).await
}
