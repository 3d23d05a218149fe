//! Running-build tracking.
//!
//! Every tick merges the builds TeamCity reports as running into the branch
//! history of their configuration. Builds that were running on the previous
//! tick but are gone now are fetched once more to record their final state.

use crate::error::AppError;
use crate::models::branch::merge_into_branches;
use crate::models::BuildConfig;
use crate::services::ci_source::CiSource;
use crate::services::mapper;
use crate::services::store::RecordStore;
use crate::services::teamcity_client::TeamCityBuild;
use std::collections::HashSet;

/// Run one tracking tick.
///
/// Returns the running builds worth following on the next tick. Never
/// fails: if the running builds cannot be fetched, `previously_running` is
/// returned unchanged.
pub async fn track_running_builds(
    ci: &dyn CiSource,
    store: &dyn RecordStore,
    previously_running: Vec<TeamCityBuild>,
) -> Vec<TeamCityBuild> {
    let running = match ci.list_active_builds().await {
        Ok(builds) => builds,
        Err(e) => {
            log::warn!("Failed to fetch running builds: {}", e);
            return previously_running;
        }
    };

    let mut useful = Vec::with_capacity(running.len());
    for build in running {
        let mut config = match load_config(store, &build).await {
            Some(config) => config,
            None => continue,
        };
        if config.dashboard_ids.is_empty() {
            continue;
        }
        if let Err(e) = merge_build(store, &mut config, &build).await {
            log::warn!(
                "Failed to store running build {} of {}: {}",
                build.id,
                build.build_type_id,
                e
            );
        }
        useful.push(build);
    }

    let still_running: HashSet<i64> = useful.iter().map(|b| b.id).collect();
    for finished in previously_running
        .iter()
        .filter(|b| !still_running.contains(&b.id))
    {
        finalize_build(ci, store, finished).await;
    }

    useful
}

/// Fetch the final state of a build that stopped running and merge it.
/// Failures drop the build from tracking.
async fn finalize_build(ci: &dyn CiSource, store: &dyn RecordStore, build: &TeamCityBuild) {
    let Some(mut config) = load_config(store, build).await else {
        return;
    };

    let final_state = match ci.get_build_by_id(build.id).await {
        Ok(b) => b,
        Err(e) => {
            log::warn!("Failed to fetch final state of build {}: {}", build.id, e);
            return;
        }
    };
    match merge_build(store, &mut config, &final_state).await {
        Ok(()) => log::debug!(
            "Build {} of {} finished: {}",
            final_state.id,
            final_state.build_type_id,
            mapper::to_build(&final_state).status.as_str()
        ),
        Err(e) => log::warn!(
            "Failed to store final state of build {}: {}",
            final_state.id,
            e
        ),
    }
}

async fn load_config(store: &dyn RecordStore, build: &TeamCityBuild) -> Option<BuildConfig> {
    match store.find_build_config_by_id(&build.build_type_id).await {
        Ok(Some(config)) => Some(config),
        Ok(None) => {
            log::debug!(
                "Build {} belongs to untracked build config {}",
                build.id,
                build.build_type_id
            );
            None
        }
        Err(e) => {
            log::warn!(
                "Failed to look up build config {} for build {}: {}",
                build.build_type_id,
                build.id,
                e
            );
            None
        }
    }
}

/// Merge a build into its branch of `config` and persist the branch list.
///
/// On a store failure `config` keeps the merged state in memory only.
pub async fn merge_build(
    store: &dyn RecordStore,
    config: &mut BuildConfig,
    build: &TeamCityBuild,
) -> Result<(), AppError> {
    merge_into_branches(
        &mut config.branches,
        &build.branch_name,
        mapper::to_build(build),
    );
    store.replace_branches(&config.id, &config.branches).await
}
