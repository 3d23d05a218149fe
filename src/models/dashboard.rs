//! Dashboard model.
//!
//! Dashboards select which build configurations get live tracking and
//! history backfill. Saving or deleting a dashboard keeps the
//! `dashboard_ids` back-references on build configurations in step.

use crate::db::now;
use crate::error::AppError;
use crate::models::build_config::{
    add_dashboard_to_build_configs, remove_dashboard_from_build_configs,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Reference from a dashboard to a build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardBuildConfig {
    /// Build configuration id.
    pub id: String,

    /// Short label shown on the dashboard tile.
    pub abbreviation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub id: String,
    pub name: String,
    pub build_configs: Vec<DashboardBuildConfig>,
}

impl Dashboard {
    /// Ids of the referenced build configurations, in reference order.
    pub fn build_config_ids(&self) -> Vec<String> {
        self.build_configs.iter().map(|c| c.id.clone()).collect()
    }
}

#[derive(Debug, FromRow)]
struct DashboardRow {
    id: String,
    name: String,
    build_configs: String,
}

/// List all live dashboards, ordered by name.
pub async fn list_dashboards(pool: &sqlx::SqlitePool) -> Result<Vec<Dashboard>, AppError> {
    let rows = sqlx::query_as::<_, DashboardRow>(
        "SELECT id, name, build_configs FROM dashboards WHERE deleted_at IS NULL ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| -> Result<Dashboard, AppError> {
            Ok(Dashboard {
                build_configs: serde_json::from_str(&row.build_configs)?,
                id: row.id,
                name: row.name,
            })
        })
        .collect()
}

/// Insert or update a dashboard and re-link its build configuration
/// back-references, all in one transaction.
pub async fn save_dashboard(pool: &sqlx::SqlitePool, dashboard: &Dashboard) -> Result<(), AppError> {
    if dashboard.id.trim().is_empty() {
        return Err(AppError::invalid_input_field("Dashboard id must not be empty", "id"));
    }
    if let Some(blank) = dashboard.build_configs.iter().find(|c| c.id.trim().is_empty()) {
        return Err(AppError::invalid_input_field(
            format!("Build config reference '{}' has no id", blank.abbreviation),
            "buildConfigs",
        ));
    }

    let now = now();
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO dashboards (id, name, build_configs, created_at, modified_at)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           build_configs = excluded.build_configs,
           modified_at = excluded.modified_at,
           deleted_at = NULL",
    )
    .bind(&dashboard.id)
    .bind(&dashboard.name)
    .bind(serde_json::to_string(&dashboard.build_configs)?)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    remove_dashboard_from_build_configs(&mut *tx, &dashboard.id).await?;
    add_dashboard_to_build_configs(&mut *tx, &dashboard.build_config_ids(), &dashboard.id).await?;

    tx.commit().await?;
    Ok(())
}

/// Tombstone a dashboard and unlink it from every build configuration.
pub async fn delete_dashboard(pool: &sqlx::SqlitePool, id: &str) -> Result<(), AppError> {
    let now = now();
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        "UPDATE dashboards SET deleted_at = ?, modified_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found_with_id("Dashboard", id));
    }

    remove_dashboard_from_build_configs(&mut *tx, id).await?;

    tx.commit().await?;
    Ok(())
}
