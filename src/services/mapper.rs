//! Conversions from TeamCity API records to local records.

use crate::models::{Build, BuildConfig, BuildStatus, Project};
use crate::services::teamcity_client::{TeamCityBuild, TeamCityBuildType, TeamCityProject};
use chrono::{DateTime, Utc};

pub fn to_project(project: &TeamCityProject) -> Project {
    Project {
        id: project.id.clone(),
        name: project.name.clone(),
        description: project.description.clone(),
        parent_project_id: project.parent_project_id.clone(),
    }
}

/// Map a build type; branches and dashboard references are local-only and
/// start empty (the store never overwrites them from this record).
pub fn to_build_config(build_type: &TeamCityBuildType) -> BuildConfig {
    BuildConfig {
        id: build_type.id.clone(),
        name: build_type.name.clone(),
        description: build_type.description.clone(),
        project_id: build_type.project_id.clone(),
        branches: Vec::new(),
        dashboard_ids: Vec::new(),
    }
}

pub fn to_build(build: &TeamCityBuild) -> Build {
    to_build_at(build, Utc::now())
}

/// Map a build, using `now` as the finish date of builds that are still
/// open (no finish date, or a finish date before the start date).
pub fn to_build_at(build: &TeamCityBuild, now: DateTime<Utc>) -> Build {
    let finish_date = match (build.start_date, build.finish_date) {
        (Some(start), Some(finish)) if start > finish => now,
        (_, Some(finish)) => finish,
        (_, None) => now,
    };

    Build {
        id: build.id,
        number: build.number.clone(),
        status: build_status(&build.state, build.status.as_deref()),
        status_text: build.status_text.clone(),
        progress: build.percentage_complete.unwrap_or(0),
        start_date: build.start_date,
        finish_date,
    }
}

/// A running build is `running` whatever its provisional status says.
fn build_status(state: &str, status: Option<&str>) -> BuildStatus {
    if state.eq_ignore_ascii_case("running") {
        return BuildStatus::Running;
    }
    match status.map(str::to_ascii_uppercase).as_deref() {
        Some("SUCCESS") => BuildStatus::Success,
        Some("FAILURE") | Some("ERROR") => BuildStatus::Failure,
        _ => BuildStatus::Unknown,
    }
}
