use std::path::PathBuf;

use structopt::StructOpt;

use sentinel_sync::client::{HttpMonitoringClient, MonitoringApi};
use sentinel_sync::config::Config;
use sentinel_sync::filter::FilterCriteria;
use sentinel_sync::models::{now_ms, Resource, Severity};
use sentinel_sync::normalizer::Normalizer;
use sentinel_sync::store::{ReconcilingStore, StoreConfig};
use sentinel_sync::view;

/// Sentinel dashboard sync command line interface
#[derive(StructOpt, Debug)]
#[structopt(name = "sentinel", about = "Sentinel monitoring sync CLI")]
pub enum Cli {
    /// Generate a default configuration file
    Config {
        /// Output path for the configuration file
        #[structopt(short, long, default_value = "sentinel.toml")]
        output: PathBuf,
    },
    /// Fetch every resource once and print a view as JSON
    Snapshot {
        /// Path to configuration file
        #[structopt(short, long, default_value = "sentinel.toml")]
        config: PathBuf,
        /// dashboard, alerts, logs, blocked or incidents
        #[structopt(short, long, default_value = "dashboard")]
        view: String,
        /// Free-text filter
        #[structopt(short, long, default_value = "")]
        search: String,
        /// Severity filter for the alerts view
        #[structopt(long)]
        severity: Option<Severity>,
    },
    /// Resolve an alert
    Resolve {
        #[structopt(short, long, default_value = "sentinel.toml")]
        config: PathBuf,
        id: u64,
    },
    /// Block an address
    Block {
        #[structopt(short, long, default_value = "sentinel.toml")]
        config: PathBuf,
        address: String,
        #[structopt(short, long, default_value = "Manual block from dashboard")]
        reason: String,
        /// Block duration in seconds
        #[structopt(short, long, default_value = "3600")]
        duration: u64,
    },
    /// Remove a block by its identifier, e.g. 10.0.0.1:manual
    Unblock {
        #[structopt(short, long, default_value = "sentinel.toml")]
        config: PathBuf,
        identifier: String,
    },
    /// Normalize a saved API payload and report what would be kept
    Normalize {
        /// Path to a JSON payload
        #[structopt(short, long)]
        file: PathBuf,
        /// Resource the payload came from
        #[structopt(short, long)]
        resource: Resource,
    },
}

fn load_config(path: &PathBuf) -> Result<Config, Box<dyn std::error::Error>> {
    if path.exists() {
        Ok(Config::from_file(path)?)
    } else {
        eprintln!("Configuration file not found: {:?}, using defaults", path);
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();

    let cli = Cli::from_args();

    match cli {
        Cli::Config { output } => {
            let config = Config::default();
            config.to_file(&output)?;
            println!("Default configuration written to: {:?}", output);
        }
        Cli::Snapshot {
            config,
            view: view_name,
            search,
            severity,
        } => {
            let config = load_config(&config)?;
            let client = HttpMonitoringClient::new(&config.api)?;
            let normalizer = Normalizer::new(config.logs.clone());
            let mut store = ReconcilingStore::new(StoreConfig::from_config(&config));

            for resource in Resource::ALL {
                let now = now_ms();
                match client.fetch(resource).await {
                    Ok(body) => match normalizer.normalize(resource, &body) {
                        Ok((snapshot, report)) => {
                            store.record_normalization(resource, &report, now);
                            store.merge(snapshot, now);
                        }
                        Err(e) => store.record_payload_error(resource, &e.to_string(), now),
                    },
                    Err(e) => store.record_fetch_failure(resource, &e.to_string(), now),
                }
            }
            for notice in store.drain_notices() {
                eprintln!("{}", notice);
            }

            let mut criteria = FilterCriteria::default().with_search(search);
            criteria.severity = severity;
            let now = now_ms();
            let json = match view_name.as_str() {
                "alerts" => serde_json::to_string_pretty(&view::alerts_view(&store, &criteria, now))?,
                "logs" => serde_json::to_string_pretty(&view::logs_view(&store, &criteria, now))?,
                "blocked" => serde_json::to_string_pretty(&view::blocked_view(&store, &criteria, now))?,
                "incidents" => {
                    serde_json::to_string_pretty(&view::incidents_view(&store, &criteria, now))?
                }
                "dashboard" => serde_json::to_string_pretty(&view::dashboard_view(&store, now))?,
                other => {
                    eprintln!("Unknown view: {}", other);
                    std::process::exit(1);
                }
            };
            println!("{}", json);
        }
        Cli::Resolve { config, id } => {
            let client = HttpMonitoringClient::new(&load_config(&config)?.api)?;
            client.resolve_alert(id).await?;
            println!("Alert #{} resolved", id);
        }
        Cli::Block {
            config,
            address,
            reason,
            duration,
        } => {
            let client = HttpMonitoringClient::new(&load_config(&config)?.api)?;
            client.block(&address, &reason, duration).await?;
            println!("{} blocked for {}s", address, duration);
        }
        Cli::Unblock { config, identifier } => {
            let client = HttpMonitoringClient::new(&load_config(&config)?.api)?;
            client.unblock(&identifier).await?;
            println!("{} unblocked", identifier);
        }
        Cli::Normalize { file, resource } => {
            if !file.exists() {
                eprintln!("File not found: {:?}", file);
                std::process::exit(1);
            }

            let body: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            let normalizer = Normalizer::new(Config::default().logs);
            let (_, report) = normalizer.normalize(resource, &body)?;

            println!(
                "{}: {} record(s) accepted, {} dropped",
                resource, report.accepted, report.dropped
            );
            for sample in &report.samples {
                println!("  {}", sample);
            }
        }
    }

    Ok(())
}
