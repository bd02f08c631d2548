//! sosh-driver - run-counting test driver for the sosh remote shell.
//!
//! Listens on a UDP port for the remote shell, answers every prompt with the
//! next command of the chosen strategy, and mirrors the remote's output to
//! stdout. Lines typed on stdin go to the remote verbatim; `/restart` resets
//! the run count.

use clap::Parser as ClapParser;
use sosh_driver::{
    config::{ConfigError, DriverConfig, StrategyKind},
    console::Console,
    driver::{Driver, DriverError},
    transport::{Transport, TransportError},
};
use std::net::IpAddr;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// sosh-driver - run-counting test driver for the sosh remote shell
#[derive(ClapParser, Debug)]
#[command(name = "sosh-driver", version, about, long_about = None)]
struct Cli {
    /// Runs to complete before automated commands stop [default: 10]
    runs: Option<u64>,

    /// Local UDP port the remote reports to [default: 26706]
    #[arg(long)]
    port: Option<u16>,

    /// Local address to bind [default: 0.0.0.0]
    #[arg(long)]
    bind_ip: Option<IpAddr>,

    /// Command strategy [default: alternating]
    #[arg(long, value_enum)]
    strategy: Option<StrategyKind>,

    /// TOML config file; command-line flags override its values
    #[arg(long, env = "SOSH_DRIVER_CONFIG")]
    config: Option<PathBuf>,

    /// Seed for batch generation (batch-injection strategy)
    #[arg(long)]
    seed: Option<u64>,

    /// Launch shells in the background (`exec sosh &`)
    #[arg(long)]
    background_launch: bool,
}

impl Cli {
    /// Defaults, then the config file, then flags.
    fn resolve(&self) -> Result<DriverConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => DriverConfig::load(path)?.unwrap_or_else(|| {
                tracing::warn!(path = %path.display(), "config file not found, using defaults");
                DriverConfig::default()
            }),
            None => DriverConfig::default(),
        };
        if let Some(runs) = self.runs {
            config.target_runs = runs;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ip) = self.bind_ip {
            config.bind_ip = ip;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(seed) = self.seed {
            config.batch.seed = Some(seed);
        }
        if self.background_launch {
            config.background_launch = true;
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_tracing();

    // One thread: the driver is a single cooperative loop.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run(cli));
    // A blocking stdin read cannot be cancelled; don't wait for it.
    runtime.shutdown_background();
    result
}

/// Tracing goes to stderr; stdout carries the remote's mirrored output.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "sosh_driver=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = cli.resolve()?;
    let session = config.session()?;
    let transport = Transport::bind(config.bind_addr()).await?;

    tracing::info!(
        addr = %transport.local_addr(),
        strategy = ?config.strategy,
        target_runs = config.target_runs,
        "sosh-driver starting"
    );

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received Ctrl+C");
                signal_token.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for Ctrl+C"),
        }
    });

    let driver = Driver::new(transport, Console::stdin(), tokio::io::stdout(), session)
        .with_directive_marker(config.directive_marker);
    let session = driver.run(shutdown).await?;

    tracing::info!(
        runs = session.completed_runs(),
        target_runs = session.target_runs(),
        state = ?session.state(),
        "sosh-driver exiting"
    );
    Ok(())
}
