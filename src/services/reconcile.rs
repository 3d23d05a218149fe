//! Reconciliation of TeamCity projects and build configurations.
//!
//! Each pass upserts everything seen upstream first, then tombstones the
//! local records that were not seen. Per-item failures are logged and the
//! pass moves on; only failures to fetch the lists themselves abort it.

use crate::error::AppError;
use crate::services::ci_source::{CiSource, ROOT_PROJECT_ID};
use crate::services::mapper;
use crate::services::store::RecordStore;
use std::collections::HashSet;

/// Mirror the upstream project list into the store.
pub async fn reconcile_projects(
    ci: &dyn CiSource,
    store: &dyn RecordStore,
) -> Result<(), AppError> {
    let upstream = ci.list_projects().await?;

    let mut stale: HashSet<String> = store
        .list_projects()
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();

    let mut upserted = 0usize;
    for project in upstream.iter().filter(|p| p.id != ROOT_PROJECT_ID) {
        match store.upsert_project(&mapper::to_project(project)).await {
            Ok(()) => upserted += 1,
            Err(e) => log::warn!("Failed to upsert project {}: {}", project.id, e),
        }
        stale.remove(&project.id);
    }

    for id in &stale {
        if let Err(e) = store.delete_project(id).await {
            log::warn!("Failed to delete project {}: {}", id, e);
        }
    }

    log::info!(
        "Reconciled projects: {} upserted, {} removed",
        upserted,
        stale.len()
    );
    Ok(())
}

/// Mirror the upstream build configurations of locally known projects.
///
/// Configurations of projects this instance does not track are neither
/// created nor deleted.
pub async fn reconcile_build_configs(
    ci: &dyn CiSource,
    store: &dyn RecordStore,
) -> Result<(), AppError> {
    let known_projects: HashSet<String> = store
        .list_projects()
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();

    if known_projects.is_empty() {
        log::debug!("No projects known yet, skipping build configuration sync");
        return Ok(());
    }

    let upstream = ci.list_build_configs().await?;

    let mut stale: HashSet<String> = store
        .list_build_configs()
        .await?
        .into_iter()
        .filter(|c| known_projects.contains(&c.project_id))
        .map(|c| c.id)
        .collect();

    let mut upserted = 0usize;
    for build_type in upstream
        .iter()
        .filter(|b| known_projects.contains(&b.project_id))
    {
        match store
            .upsert_build_config(&mapper::to_build_config(build_type))
            .await
        {
            Ok(()) => upserted += 1,
            Err(e) => log::warn!("Failed to upsert build config {}: {}", build_type.id, e),
        }
        stale.remove(&build_type.id);
    }

    for id in &stale {
        if let Err(e) = store.delete_build_config(id).await {
            log::warn!("Failed to delete build config {}: {}", id, e);
        }
    }

    log::info!(
        "Reconciled build configs: {} upserted, {} removed",
        upserted,
        stale.len()
    );
    Ok(())
}
