//! History backfill for build configurations shown on dashboards.

use crate::error::AppError;
use crate::models::{Branch, Build};
use crate::services::ci_source::CiSource;
use crate::services::mapper;
use crate::services::store::RecordStore;
use crate::services::teamcity_client::TeamCityBuild;
use std::collections::HashSet;

/// Number of recent builds requested per build configuration.
pub const HISTORY_FETCH_LIMIT: u32 = 1000;

/// Rewrite the branch history of every dashboard-referenced configuration
/// from the builds TeamCity reports for it.
///
/// Only a failure to list dashboards is returned; per-configuration fetch
/// and store failures are logged and skipped.
pub async fn backfill_history(ci: &dyn CiSource, store: &dyn RecordStore) -> Result<(), AppError> {
    let dashboards = store.list_dashboards().await?;
    if dashboards.is_empty() {
        return Ok(());
    }

    let mut seen = HashSet::new();
    let config_ids: Vec<String> = dashboards
        .iter()
        .flat_map(|d| d.build_config_ids())
        .filter(|id| seen.insert(id.clone()))
        .collect();

    for config_id in &config_ids {
        let builds = match ci
            .list_builds_for_config(config_id, HISTORY_FETCH_LIMIT)
            .await
        {
            Ok(builds) => builds,
            Err(e) => {
                log::warn!("Failed to fetch build history of {}: {}", config_id, e);
                continue;
            }
        };

        let branches = group_by_branch(&builds);
        if branches.is_empty() {
            continue;
        }
        if let Err(e) = store.replace_branches(config_id, &branches).await {
            log::warn!("Failed to store build history of {}: {}", config_id, e);
        }
    }

    log::info!("Backfilled history for {} build config(s)", config_ids.len());
    Ok(())
}

/// Group builds by branch name in order of first appearance; each branch
/// keeps its newest builds only.
fn group_by_branch(builds: &[TeamCityBuild]) -> Vec<Branch> {
    let mut grouped: Vec<(String, Vec<Build>)> = Vec::new();
    for build in builds {
        let mapped = mapper::to_build(build);
        match grouped.iter_mut().find(|(name, _)| *name == build.branch_name) {
            Some((_, list)) => list.push(mapped),
            None => grouped.push((build.branch_name.clone(), vec![mapped])),
        }
    }

    grouped
        .into_iter()
        .map(|(name, builds)| Branch::with_builds(name, builds))
        .collect()
}
