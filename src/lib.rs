pub mod acquisition;
pub mod analysis;
pub mod db;
pub mod mirror;
pub mod sessions;
pub mod settings;
pub mod sleep_date;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{info, warn};

pub use acquisition::{AcquisitionController, SupervisorState};
pub use analysis::{
    detect_desaturations, summarize_session, AnalysisConfig, DesaturationEvent, SessionSummary,
};
pub use db::{Database, Reading, SessionInfo};
pub use mirror::Mirror;
pub use sessions::{find_gaps, GapInterval, SessionStore};
pub use settings::{AppConfig, ConfigError};
pub use sleep_date::sleep_date_for;

/// Service entry point: load config, open the store, reconcile the current
/// mirror file, then supervise the acquisition process until shutdown.
pub async fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("oximon starting up...");

    // Full CLI parsing belongs to outer tooling; the only argument honored
    // here is an optional config file path.
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("oximon.json"));
    let config = AppConfig::load(&config_path)?;

    let db = Database::new(config.db_path.clone())?;
    let mirror = Mirror::new(config.mirror_dir.clone())?;

    // A crash between the store write and the mirror append can leave the
    // mirror short; the store is authoritative, so rewrite today's file.
    let current_date = sleep_date_for(Utc::now(), config.timezone);
    let readings = db.load_session(current_date).await?;
    if !readings.is_empty() {
        if let Err(err) = mirror.rebuild(current_date, &readings) {
            warn!("failed to reconcile mirror for {current_date}: {err:?}");
        } else {
            info!(
                "reconciled mirror for {current_date} ({} readings)",
                readings.len()
            );
        }
    }

    let mut controller = AcquisitionController::new();
    controller.start(config, db, mirror)?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");

    controller.stop().await?;
    info!("oximon stopped");
    Ok(())
}
