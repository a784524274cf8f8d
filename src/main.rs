mod domain;
mod error;
mod infrastructure;
mod presentation;

use anyhow::Result;
use clap::Parser;
use domain::settings::SettingsService;
use infrastructure::local_storage::LocalStorage;
use infrastructure::remote::RemoteSession;
use presentation::app::ConsoleApp;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Console client for a remote BLE scanning/advertising controller
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Controller address (`host:port` or `ws://` URL); defaults to the last one used
    address: Option<String>,

    /// Settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Local state file (server address, theme, scanned devices)
    #[arg(long)]
    storage: Option<PathBuf>,

    /// Manufacturer table (JSON object of company id → name)
    #[arg(long)]
    manufacturers: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let settings_service = match &args.settings {
        Some(path) => SettingsService::with_path(path.clone()),
        None => SettingsService::new()?,
    };
    let settings = settings_service.get().clone();

    let _logging_guard = infrastructure::logging::init_logger(&settings.log_settings)
        .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
        .ok();

    tracing::info!("Starting BLE Replay Client");
    match settings_service.save_if_missing() {
        Ok(true) => tracing::info!("Wrote default settings"),
        Ok(false) => {}
        Err(e) => tracing::warn!("Could not write default settings: {:#}", e),
    }

    let storage = match args.storage {
        Some(path) => LocalStorage::open(path),
        None => LocalStorage::open(LocalStorage::default_path()?),
    };
    let manufacturer_source = args
        .manufacturers
        .unwrap_or_else(|| settings_service.manufacturer_table_path());

    let address = args.address;
    let connect_timeout = settings_service.connect_timeout();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let session = RemoteSession::new(storage, Some(manufacturer_source), event_tx, transport_tx)
            .with_connect_timeout(connect_timeout);

        ConsoleApp::new(session, settings.default_scan_seconds)
            .run(address, event_rx, transport_rx)
            .await
    })
}
