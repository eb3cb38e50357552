//! IP Reservation Controller
//!
//! Reserves, re-reserves and releases director IP addresses.
//!
//! Loads the declared networks and a claims file, runs every claim against
//! the persisted IP store with a bounded worker pool, and prints a JSON
//! summary of the outcomes.

mod config;
mod controller;
mod error;


use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    info!("Starting IP Reservation Controller");

    // Load configuration from environment variables
    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Network config: {}", config.network_config.display());
    info!("  Claims file: {}", config.claims_file.display());
    info!("  Database: {}", config.database_url);
    info!("  Task: {}", config.task_id);
    info!("  Workers: {}", config.max_workers);
    info!("  Director IPs: {:?}", config.director_ips);

    // Initialize and run controller
    let controller = Controller::new(&config).await?;
    let outcomes = controller.run().await;

    println!("{}", serde_json::to_string_pretty(&outcomes)?);

    let failed = outcomes.iter().filter(|outcome| outcome.is_failed()).count();
    if failed > 0 {
        warn!("{} of {} claims failed", failed, outcomes.len());
        return Err(ControllerError::ClaimsFailed(failed));
    }
    Ok(())
}
