//! Background sync engine for TeamCity mirroring.
//!
//! The engine runs a full sync (projects, build configurations, history
//! backfill) on start and on demand, and polls running builds in between.
//! The poll interval adapts to activity: short while any tracked build is
//! running, long otherwise.
//!
//! A single spawned task owns all poll state. Other components talk to it
//! through a [`SyncHandle`] that sends commands over an mpsc channel.

use crate::db::now;
use crate::error::AppError;
use crate::services::build_tracker;
use crate::services::ci_source::CiSource;
use crate::services::history;
use crate::services::reconcile;
use crate::services::store::RecordStore;
use crate::services::teamcity_client::TeamCityBuild;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::time;

/// Default poll interval while no build is running.
pub const DEFAULT_IDLE_INTERVAL_SECS: u64 = 20;

/// Default poll interval while builds are running.
pub const DEFAULT_ACTIVE_INTERVAL_SECS: u64 = 5;

/// How long [`SyncHandle::stop`] waits for the loop to exit.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

const COMMAND_BUFFER: usize = 16;

fn duration_ms(interval: Duration) -> u64 {
    u64::try_from(interval.as_millis()).unwrap_or(u64::MAX)
}

/// Sync engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Poll interval while nothing is running.
    pub idle_interval: Duration,

    /// Poll interval while at least one tracked build is running.
    pub active_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(DEFAULT_IDLE_INTERVAL_SECS),
            active_interval: Duration::from_secs(DEFAULT_ACTIVE_INTERVAL_SECS),
        }
    }
}

/// Status of the sync engine.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    /// Whether a full sync is in progress.
    pub is_refreshing: bool,

    /// Last successful full sync timestamp.
    pub last_refresh_time: Option<i64>,

    /// Last full sync error message.
    pub last_error: Option<String>,

    /// Number of running builds tracked after the last poll.
    pub running_builds: usize,

    /// Interval until the next poll, in milliseconds.
    pub poll_interval_ms: u64,

    /// Last running-build poll timestamp.
    pub last_poll_time: Option<i64>,
}

/// Commands that can be sent to the sync engine.
#[derive(Debug)]
pub enum SyncCommand {
    /// Run a full sync now.
    Refresh,

    /// Stop the sync engine.
    Stop,
}

/// The steps the engine sequences. One capability per step, so tests can
/// substitute any of them.
#[async_trait]
pub trait SyncSteps: Send + Sync + 'static {
    async fn reconcile_projects(&self) -> Result<(), AppError>;

    async fn reconcile_build_configs(&self) -> Result<(), AppError>;

    async fn backfill_history(&self) -> Result<(), AppError>;

    /// Poll running builds; never fails.
    async fn track_running_builds(
        &self,
        previously_running: Vec<TeamCityBuild>,
    ) -> Vec<TeamCityBuild>;
}

/// Production steps over a CI source and a record store.
pub struct Synchronizer<C, S> {
    ci: C,
    store: S,
}

impl<C: CiSource, S: RecordStore> Synchronizer<C, S> {
    pub fn new(ci: C, store: S) -> Self {
        Self { ci, store }
    }
}

#[async_trait]
impl<C, S> SyncSteps for Synchronizer<C, S>
where
    C: CiSource + 'static,
    S: RecordStore + 'static,
{
    async fn reconcile_projects(&self) -> Result<(), AppError> {
        reconcile::reconcile_projects(&self.ci, &self.store).await
    }

    async fn reconcile_build_configs(&self) -> Result<(), AppError> {
        reconcile::reconcile_build_configs(&self.ci, &self.store).await
    }

    async fn backfill_history(&self) -> Result<(), AppError> {
        history::backfill_history(&self.ci, &self.store).await
    }

    async fn track_running_builds(
        &self,
        previously_running: Vec<TeamCityBuild>,
    ) -> Vec<TeamCityBuild> {
        build_tracker::track_running_builds(&self.ci, &self.store, previously_running).await
    }
}

/// Cloneable sender for refresh requests, for components that must not be
/// able to stop the engine.
#[derive(Clone)]
pub struct RefreshHandle {
    command_tx: mpsc::Sender<SyncCommand>,
}

impl RefreshHandle {
    /// Ask for a full sync without waiting for it.
    ///
    /// Requests made while one is already queued are coalesced.
    pub fn request_refresh(&self) -> Result<(), AppError> {
        match self.command_tx.try_send(SyncCommand::Refresh) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::debug!("Refresh already pending");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(AppError::internal("Sync engine not running"))
            }
        }
    }
}

/// Handle for controlling the background sync loop.
pub struct SyncHandle {
    /// Command channel sender.
    command_tx: mpsc::Sender<SyncCommand>,

    /// Fires when the loop has exited.
    stopped: oneshot::Receiver<()>,

    status: Arc<RwLock<SyncStatus>>,
}

impl SyncHandle {
    /// Ask for a full sync without waiting for it.
    pub fn request_refresh(&self) -> Result<(), AppError> {
        self.refresher().request_refresh()
    }

    pub fn refresher(&self) -> RefreshHandle {
        RefreshHandle {
            command_tx: self.command_tx.clone(),
        }
    }

    /// Get the current status.
    pub async fn status(&self) -> SyncStatus {
        self.status.read().await.clone()
    }

    /// Stop the loop and wait up to [`STOP_TIMEOUT`] for it to exit.
    ///
    /// A step in progress is not interrupted; if it outlasts the timeout
    /// the shutdown is abandoned and an error is returned.
    pub async fn stop(self) -> Result<(), AppError> {
        let command_tx = self.command_tx;
        let stopped = self.stopped;
        let shutdown = async move {
            // A closed channel means the loop is already gone.
            let _ = command_tx.send(SyncCommand::Stop).await;
            let _ = stopped.await;
        };

        match time::timeout(STOP_TIMEOUT, shutdown).await {
            Ok(()) => {
                log::info!("Sync engine stopped");
                Ok(())
            }
            Err(_) => {
                log::error!(
                    "Sync engine did not stop within {}s, abandoning shutdown",
                    STOP_TIMEOUT.as_secs()
                );
                Err(AppError::sync("Timed out waiting for sync engine to stop"))
            }
        }
    }
}

/// Background sync engine.
pub struct SyncEngine<T> {
    steps: T,
    config: SyncConfig,
    status: Arc<RwLock<SyncStatus>>,
}

impl<T: SyncSteps> SyncEngine<T> {
    pub fn new(steps: T, config: SyncConfig) -> Self {
        let status = SyncStatus {
            poll_interval_ms: duration_ms(config.idle_interval),
            ..SyncStatus::default()
        };
        Self {
            steps,
            config,
            status: Arc::new(RwLock::new(status)),
        }
    }

    /// Run the initial full sync, then spawn the poll loop.
    ///
    /// Fails if projects or build configurations cannot be synced; the
    /// loop is not started in that case.
    pub async fn start(self) -> Result<SyncHandle, AppError> {
        log::info!("Running initial sync...");
        self.refresh().await?;

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (stopped_tx, stopped_rx) = oneshot::channel();
        let status = self.status.clone();

        tokio::spawn(async move {
            self.run(command_rx).await;
            let _ = stopped_tx.send(());
        });

        Ok(SyncHandle {
            command_tx,
            stopped: stopped_rx,
            status,
        })
    }

    async fn run(self, mut command_rx: mpsc::Receiver<SyncCommand>) {
        let mut interval = self.config.idle_interval;
        let mut previously_running: Vec<TeamCityBuild> = Vec::new();

        loop {
            tokio::select! {
                biased;

                cmd = command_rx.recv() => match cmd {
                    Some(SyncCommand::Refresh) => {
                        log::info!("Refresh requested");
                        if let Err(e) = self.refresh().await {
                            log::error!("Refresh failed: {}", e);
                        }
                    }
                    Some(SyncCommand::Stop) | None => {
                        log::info!("Sync engine stopping");
                        break;
                    }
                },
                _ = time::sleep(interval) => {
                    previously_running = self
                        .steps
                        .track_running_builds(std::mem::take(&mut previously_running))
                        .await;
                    interval = if previously_running.is_empty() {
                        self.config.idle_interval
                    } else {
                        self.config.active_interval
                    };

                    let mut status = self.status.write().await;
                    status.running_builds = previously_running.len();
                    status.poll_interval_ms = duration_ms(interval);
                    status.last_poll_time = Some(now());
                }
            }
        }
    }

    /// Projects, then build configurations, then history. History failures
    /// are logged only.
    async fn refresh(&self) -> Result<(), AppError> {
        self.status.write().await.is_refreshing = true;
        let result = self.refresh_steps().await;

        let mut status = self.status.write().await;
        status.is_refreshing = false;
        match &result {
            Ok(()) => {
                status.last_refresh_time = Some(now());
                status.last_error = None;
            }
            Err(e) => status.last_error = Some(e.to_string()),
        }
        result
    }

    async fn refresh_steps(&self) -> Result<(), AppError> {
        self.steps.reconcile_projects().await?;
        self.steps.reconcile_build_configs().await?;
        if let Err(e) = self.steps.backfill_history().await {
            log::warn!("History backfill failed: {}", e);
        }
        Ok(())
    }
}
