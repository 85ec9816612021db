use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use sentinel_sync::client::HttpMonitoringClient;
use sentinel_sync::config::Config;
use sentinel_sync::engine::{EngineEvent, SyncEngine};
use sentinel_sync::output::{OutputFormat, OutputHandler};

/// Sync daemon: keeps the dashboard views in step with the monitoring API
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting sentinel sync daemon...");

    // Load configuration
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sentinel.toml"));

    let config = if config_path.exists() {
        Config::from_file(&config_path)?
    } else {
        log::warn!("Config file not found, using defaults");
        Config::default()
    };

    // Setup graceful shutdown signal handling
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal, gracefully stopping...");
        let _ = shutdown_tx.send(true);
    })?;

    let output_format = OutputFormat::from_str(&config.output.format);
    let mut output_handler = OutputHandler::new(output_format, config.output.file_path.clone())?;

    let api = Arc::new(HttpMonitoringClient::new(&config.api)?);
    let mut engine = SyncEngine::new(&config, api);
    engine.start();

    log::info!("Syncing with {}. Press Ctrl+C to stop.", config.api.base_url);

    let mut render = tokio::time::interval(Duration::from_secs(config.output.render_interval_secs));
    render.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = engine.next_event() => {
                log_event(&event);
                for notice in engine.drain_notices() {
                    output_handler.write_notice(&notice)?;
                }
            }
            _ = render.tick() => {
                output_handler.write_dashboard(&engine.dashboard())?;
            }
            _ = shutdown_rx.changed() => break,
        }
    }

    engine.shutdown();
    output_handler.flush()?;
    log::info!("Sentinel sync daemon stopped");
    Ok(())
}

fn log_event(event: &EngineEvent) {
    match event {
        EngineEvent::Merged { resource, report } => {
            log::debug!("Merged {} ({} records)", resource, report.accepted);
        }
        EngineEvent::CommandAccepted(id) => log::debug!("Command {} accepted", id),
        EngineEvent::CommandRejected(id) => log::warn!("Command {} rejected", id),
        // failures are logged by the engine and surfaced as notices
        _ => {}
    }
}
