//! TeamCity project model.

use crate::db::{now, TOMBSTONE_TTL_SECS};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Locally mirrored TeamCity project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// TeamCity project id (e.g. "Backend_Api").
    pub id: String,

    pub name: String,

    pub description: String,

    /// Parent project id; "_Root" for top-level projects.
    pub parent_project_id: String,
}

/// List all live (non-tombstoned) projects, ordered by name.
pub async fn list_projects(pool: &sqlx::SqlitePool) -> Result<Vec<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        "SELECT id, name, description, parent_project_id
         FROM projects WHERE deleted_at IS NULL ORDER BY name",
    )
    .fetch_all(pool)
    .await
}

/// Upsert a project (insert or update on conflict), clearing any tombstone.
pub async fn upsert_project(pool: &sqlx::SqlitePool, project: &Project) -> Result<(), sqlx::Error> {
    let now = now();

    sqlx::query(
        "INSERT INTO projects (id, name, description, parent_project_id, created_at, modified_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           description = excluded.description,
           parent_project_id = excluded.parent_project_id,
           modified_at = excluded.modified_at,
           deleted_at = NULL",
    )
    .bind(&project.id)
    .bind(&project.name)
    .bind(&project.description)
    .bind(&project.parent_project_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Tombstone a project and purge tombstones past their expiry.
///
/// Returns the number of rows tombstoned (0 if the project is unknown or
/// already deleted).
pub async fn delete_project(pool: &sqlx::SqlitePool, id: &str) -> Result<u64, sqlx::Error> {
    let now = now();

    let result = sqlx::query(
        "UPDATE projects SET deleted_at = ?, modified_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    sqlx::query("DELETE FROM projects WHERE deleted_at IS NOT NULL AND deleted_at < ?")
        .bind(now - TOMBSTONE_TTL_SECS)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
