//! Build Monitor - TeamCity mirror and polling engine.
//!
//! Mirrors TeamCity projects, build configurations and recent branch
//! history into a local SQLite database and keeps it fresh.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

use config::Config;
use error::AppError;
use services::{SqliteStore, SyncEngine, SyncHandle, Synchronizer, TeamCityClient};

/// Open the database, start the sync engine and run until Ctrl-C.
///
/// On Unix, `SIGHUP` requests an immediate refresh.
pub async fn run(config: Config) -> Result<(), AppError> {
    let pool = db::initialize(&config.db).await?;
    let store = SqliteStore::new(pool);
    let client = TeamCityClient::new(config.client_config())?;

    log::info!(
        "Mirroring {} into {} (poll every {:?}, {:?} while builds run)",
        config.tc_url,
        config.db.display(),
        config.tc_poll_interval,
        config.tc_running_build_poll_interval
    );

    let engine = SyncEngine::new(Synchronizer::new(client, store), config.sync_config());
    let handle = engine.start().await?;

    let waited = wait_for_shutdown(&handle).await;
    handle.stop().await?;
    waited
}

#[cfg(unix)]
async fn wait_for_shutdown(handle: &SyncHandle) -> Result<(), AppError> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())
        .map_err(|e| AppError::internal(format!("Failed to install SIGHUP handler: {}", e)))?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                return result
                    .map_err(|e| AppError::internal(format!("Failed to listen for Ctrl-C: {}", e)));
            }
            _ = hangup.recv() => {
                log::info!("SIGHUP received, requesting refresh");
                if let Err(e) = handle.request_refresh() {
                    log::warn!("Failed to request refresh: {}", e);
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_handle: &SyncHandle) -> Result<(), AppError> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| AppError::internal(format!("Failed to listen for Ctrl-C: {}", e)))
}
