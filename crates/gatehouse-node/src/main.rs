//! Gatehouse door node
//!
//! Loads configuration, wires the production handlers into the engine and
//! runs both execution contexts until SIGINT or SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use gatehouse_effects::{
    FilesystemRegistryStorage, LineReaderHandler, RealTimeHandler, SpoolRemoteHandler,
    SysfsGpioHandler, SystemInfoHandler,
};
use gatehouse_engine::{Node, NodeEffects};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::{default_storage_path, NodeConfig};

#[derive(Parser)]
#[command(name = "gatehouse")]
#[command(about = "Gatehouse - Offline-First Access-Control Node", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Device id used in remote paths
    #[arg(long)]
    device_id: Option<String>,

    /// Root for registry, audit and spool directories
    #[arg(long)]
    storage_path: Option<PathBuf>,

    /// Spool directory shared with the uplink
    #[arg(long)]
    spool_path: Option<PathBuf>,

    /// Credential reader line source (`-` for stdin)
    #[arg(long)]
    reader: Option<String>,

    /// Print the resolved configuration and exit
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| default_storage_path().join("config.toml"))
    }

    fn apply_overrides(&self, config: &mut NodeConfig) {
        if let Some(device_id) = &self.device_id {
            config.device.device_id = device_id.clone();
        }
        if let Some(path) = &self.storage_path {
            config.storage.base_path = path.clone();
        }
        if let Some(path) = &self.spool_path {
            config.remote.spool_path = Some(path.clone());
        }
        if let Some(reader) = &self.reader {
            config.hardware.reader_path = reader.clone();
        }
    }
}

fn load_config(cli: &Cli) -> Result<NodeConfig> {
    let mut config = NodeConfig::from_file(&cli.config_path())?;
    config.apply_env()?;
    cli.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn init_logging(verbose: bool, config: &NodeConfig) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_effects(config: &NodeConfig) -> Result<NodeEffects> {
    let storage = FilesystemRegistryStorage::new(config.storage.registry_path())
        .context("opening registry storage")?;
    let remote = SpoolRemoteHandler::new(config.spool_path()).context("opening uplink spool")?;
    let gpio = Arc::new(
        SysfsGpioHandler::open(&config.hardware.gpio_root, config.hardware.pins())
            .context("configuring gpio")?,
    );
    let reader = match config.hardware.reader_path.as_str() {
        "-" => LineReaderHandler::stdin(),
        path => LineReaderHandler::open(Path::new(path)),
    }
    .context("opening credential reader")?;

    Ok(NodeEffects {
        time: Arc::new(RealTimeHandler::new()),
        remote: Arc::new(remote),
        system: Arc::new(SystemInfoHandler::new()),
        outputs: gpio.clone(),
        input: gpio,
        reader: Arc::new(reader),
        storage: Arc::new(storage),
    })
}

#[cfg(unix)]
async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if cli.print_config {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    init_logging(cli.verbose, &config);

    let settings = config.to_settings()?;
    let effects = build_effects(&config)?;
    let node = Node::start(settings, effects)?;
    info!(
        device = %config.device.device_id,
        firmware = %config.device.firmware_version,
        storage = %config.storage.base_path.display(),
        "gatehouse node running"
    );

    shutdown_signal().await?;
    info!("shutting down");
    node.shutdown().await;
    Ok(())
}
