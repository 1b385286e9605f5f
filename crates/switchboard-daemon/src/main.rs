//! Switchboard Daemon - Main entry point
//!
//! Builds the device registry from configuration, connects to the hub and
//! publishes the registry until interrupted.

mod api;
mod config;
mod server;

use anyhow::Result;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use switchboard_core::DeviceRegistry;
use switchboard_hub::{HttpHubClient, HubSession, StartOptions};
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "switchboard")]
#[command(about = "Device adapter registry and hub publishing daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "switchboard.toml")]
    config: PathBuf,

    /// Bind address for the publishing server
    #[arg(short, long)]
    bind: Option<IpAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Search the registry for a device and exit
    #[arg(long)]
    search: Option<String>,

    /// List all registered devices and exit
    #[arg(long)]
    list: bool,

    /// Write an example configuration file and exit
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Switchboard v{}", env!("CARGO_PKG_VERSION"));

    if args.init_config {
        config::save_default_config(&args.config)?;
        println!("Wrote example configuration to {}", args.config.display());
        return Ok(());
    }

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Override bind address if specified
    if let Some(bind) = args.bind {
        config.server.bind = Some(bind);
    }

    let hub_client = Arc::new(HttpHubClient::new(config.hub.host, config.hub.port)?);
    let registry = Arc::new(DeviceRegistry::build_with(
        config.to_descriptors(),
        hub_client.clone(),
    )?);

    if let Some(query) = args.search.as_deref() {
        let results = registry.search(Some(query));
        println!("{} match(es) for {:?}:", results.len(), query);
        for result in results {
            println!(
                "  [{}] {} ({} / {}) score {:.2}",
                result.item.id,
                result.item.display_name,
                result.item.manufacturer,
                result.item.adapter_name,
                result.score
            );
        }
        return Ok(());
    }

    if args.list {
        println!("{} device(s):", registry.len());
        for device in registry.devices() {
            println!(
                "  [{}] {} - {} {}",
                device.id, device.display_name, device.manufacturer, device.device_type
            );
        }
        return Ok(());
    }

    // Daemon mode - publish the registry to the hub
    let session = HubSession::connect(
        config.hub.host,
        config.hub.port,
        hub_client,
        Arc::new(server::HttpSurface),
    )
    .await?;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            interrupt.cancel();
        }
    });

    let options = StartOptions {
        address: config.server.bind,
        port: config.server.port,
    };
    let addr = session
        .start_server(&config.server.name, registry, options, &cancel)
        .await?;
    info!(
        address = %addr,
        hub = %session.host_name,
        region = %session.region,
        "Registry published"
    );

    cancel.cancelled().await;
    session.stop_server().await?;

    Ok(())
}
