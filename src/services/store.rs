//! Record store interface used by the sync engine.
//!
//! Upserts are "update if exists, else insert", keyed by TeamCity id, and
//! never overwrite local-only fields (branch history, dashboard references).
//! Deletes are soft: records are tombstoned and expire later.

use crate::db::pool::DbPool;
use crate::error::AppError;
use crate::models::{build_config, dashboard, project};
use crate::models::{Branch, BuildConfig, Dashboard, Project};
use async_trait::async_trait;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn upsert_project(&self, project: &Project) -> Result<(), AppError>;

    async fn delete_project(&self, id: &str) -> Result<(), AppError>;

    async fn list_projects(&self) -> Result<Vec<Project>, AppError>;

    async fn upsert_build_config(&self, config: &BuildConfig) -> Result<(), AppError>;

    async fn delete_build_config(&self, id: &str) -> Result<(), AppError>;

    async fn list_build_configs(&self) -> Result<Vec<BuildConfig>, AppError>;

    /// `Ok(None)` when no live configuration has this id.
    async fn find_build_config_by_id(&self, id: &str) -> Result<Option<BuildConfig>, AppError>;

    /// Overwrite the branch list of an existing configuration.
    async fn replace_branches(&self, config_id: &str, branches: &[Branch]) -> Result<(), AppError>;

    async fn list_dashboards(&self) -> Result<Vec<Dashboard>, AppError>;
}

/// SQLite-backed record store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn upsert_project(&self, project: &Project) -> Result<(), AppError> {
        project::upsert_project(&self.pool, project)
            .await
            .map_err(|e| AppError::database_with_op(e.to_string(), "upsert_project"))
    }

    async fn delete_project(&self, id: &str) -> Result<(), AppError> {
        let deleted = project::delete_project(&self.pool, id)
            .await
            .map_err(|e| AppError::database_with_op(e.to_string(), "delete_project"))?;
        if deleted == 0 {
            return Err(AppError::not_found_with_id("Project", id));
        }
        Ok(())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, AppError> {
        Ok(project::list_projects(&self.pool).await?)
    }

    async fn upsert_build_config(&self, config: &BuildConfig) -> Result<(), AppError> {
        build_config::upsert_build_config(&self.pool, config)
            .await
            .map_err(|e| AppError::database_with_op(e.to_string(), "upsert_build_config"))
    }

    async fn delete_build_config(&self, id: &str) -> Result<(), AppError> {
        let deleted = build_config::delete_build_config(&self.pool, id)
            .await
            .map_err(|e| AppError::database_with_op(e.to_string(), "delete_build_config"))?;
        if deleted == 0 {
            return Err(AppError::not_found_with_id("BuildConfig", id));
        }
        Ok(())
    }

    async fn list_build_configs(&self) -> Result<Vec<BuildConfig>, AppError> {
        build_config::list_build_configs(&self.pool).await
    }

    async fn find_build_config_by_id(&self, id: &str) -> Result<Option<BuildConfig>, AppError> {
        build_config::find_build_config(&self.pool, id).await
    }

    async fn replace_branches(&self, config_id: &str, branches: &[Branch]) -> Result<(), AppError> {
        build_config::replace_branches(&self.pool, config_id, branches).await
    }

    async fn list_dashboards(&self) -> Result<Vec<Dashboard>, AppError> {
        dashboard::list_dashboards(&self.pool).await
    }
}
