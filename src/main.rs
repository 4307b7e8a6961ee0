//! flightpath console
//!
//! Builds a path from typed commands and location searches, and plays the
//! flight animation with map operations rendered as log lines.

use anyhow::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use flightpath::config::{Config, LoggingConfig};
use flightpath::console::{self, ConsoleCaptureHost, ConsoleMap};
use flightpath::coordinator::{create_coordinator_channels, Coordinator, CoordinatorCommand};
use flightpath::geocode::NominatimGeocoder;
use flightpath::logging;
use flightpath::waypoints::LocalStore;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    // Logging is configured from the file, so it comes up after the load
    let config = Config::load()?;

    // Keep the guard alive so buffered log lines are flushed on exit
    let _log_guard = logging::init_logging(&config.logging)?;
    info!("flightpath starting...");
    info!("Configuration loaded from {:?}", config.config_path());

    let data_dir = config.data_directory()?;
    info!("Waypoints stored in {:?}", data_dir);
    let local_store = LocalStore::new(data_dir);

    // Capture and map hosts are single-threaded
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let (cmd_tx, cmd_rx, event_tx, event_rx) = create_coordinator_channels();
    let shutdown = CancellationToken::new();

    // Set up Ctrl+C handler that sends shutdown command
    let ctrl_c_tx = cmd_tx.clone();
    let ctrl_c_token = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Ctrl+C received, shutting down...");
        if ctrl_c_tx.try_send(CoordinatorCommand::Shutdown).is_err() {
            warn!("Could not queue shutdown command");
        }
        ctrl_c_token.cancel();
    })?;

    let geocoder = NominatimGeocoder::new(&config.geocoding);
    let mut coordinator = Coordinator::new(
        config,
        ConsoleMap::new(),
        ConsoleCaptureHost,
        geocoder,
        local_store,
        cmd_rx,
        event_tx,
    );

    println!("flightpath - type 'help' for commands");

    let engine_token = shutdown.clone();
    let (engine_result, input_result) = runtime.block_on(async {
        tokio::join!(
            async {
                let result = coordinator.run().await;
                engine_token.cancel();
                result
            },
            console::run_input_loop(cmd_tx, event_rx, shutdown),
        )
    });

    if let Err(e) = &engine_result {
        error!("Coordinator error: {:#}", e);
    }
    if let Err(e) = &input_result {
        error!("Input error: {:#}", e);
    }

    // stdin is read on a blocking thread that never returns on its own
    runtime.shutdown_timeout(Duration::from_millis(200));

    info!("Shutdown complete");
    engine_result.and(input_result)
}

fn print_help() {
    println!("flightpath - Animated waypoint flight paths");
    println!();
    println!("USAGE:");
    println!("    flightpath [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help    Print this help message");
    println!();
    console::print_commands();
    println!();
    println!("ENVIRONMENT:");
    println!("    RUST_LOG             Set log level (e.g., debug, info, warn)");
    println!("    FLIGHTPATH_LOG_PATH  Override the log directory");
    if let Ok(dir) = logging::log_directory(&LoggingConfig::default()) {
        println!();
        println!("Logs are written to {}", dir.display());
    }
}
