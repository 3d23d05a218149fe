//! Fetch interface over the external CI server.
//!
//! The reconcilers only see this trait, so tests can substitute an
//! in-memory source for the HTTP client.

use crate::error::AppError;
use crate::services::teamcity_client::{TeamCityBuild, TeamCityBuildType, TeamCityProject};
use async_trait::async_trait;

/// Id of TeamCity's synthetic root project ("no parent").
pub const ROOT_PROJECT_ID: &str = "_Root";

/// Read access to the CI server. Calls are not retried.
#[async_trait]
pub trait CiSource: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<TeamCityProject>, AppError>;

    async fn list_build_configs(&self) -> Result<Vec<TeamCityBuildType>, AppError>;

    /// Builds currently running on any branch.
    async fn list_active_builds(&self) -> Result<Vec<TeamCityBuild>, AppError>;

    async fn get_build_by_id(&self, build_id: i64) -> Result<TeamCityBuild, AppError>;

    /// Up to `limit` recent builds of one build configuration.
    async fn list_builds_for_config(
        &self,
        config_id: &str,
        limit: u32,
    ) -> Result<Vec<TeamCityBuild>, AppError>;
}
