//! TeamCity build configuration model.
//!
//! `branches` and `dashboard_ids` are local-only columns: the reconciler
//! upsert never writes them, only `replace_branches` and the dashboard
//! linking helpers do.

use crate::db::{now, TOMBSTONE_TTL_SECS};
use crate::error::AppError;
use crate::models::branch::Branch;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection};

/// Locally mirrored TeamCity build configuration ("build type").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    /// TeamCity build type id (e.g. "Backend_Api_Build").
    pub id: String,

    pub name: String,

    pub description: String,

    /// Owning project id.
    pub project_id: String,

    /// Branch histories in order of discovery.
    pub branches: Vec<Branch>,

    /// Dashboards referencing this configuration.
    pub dashboard_ids: Vec<String>,
}

/// Database row for a build configuration; JSON columns still encoded.
#[derive(Debug, FromRow)]
struct BuildConfigRow {
    id: String,
    name: String,
    description: String,
    project_id: String,
    branches: String,
    dashboard_ids: String,
}

impl TryFrom<BuildConfigRow> for BuildConfig {
    type Error = AppError;

    fn try_from(row: BuildConfigRow) -> Result<Self, Self::Error> {
        Ok(BuildConfig {
            branches: serde_json::from_str(&row.branches)?,
            dashboard_ids: serde_json::from_str(&row.dashboard_ids)?,
            id: row.id,
            name: row.name,
            description: row.description,
            project_id: row.project_id,
        })
    }
}

const SELECT_COLUMNS: &str =
    "SELECT id, name, description, project_id, branches, dashboard_ids FROM build_configs";

/// List all live build configurations, ordered by name.
pub async fn list_build_configs(pool: &sqlx::SqlitePool) -> Result<Vec<BuildConfig>, AppError> {
    let rows = sqlx::query_as::<_, BuildConfigRow>(&format!(
        "{} WHERE deleted_at IS NULL ORDER BY name",
        SELECT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(BuildConfig::try_from).collect()
}

/// Look up a live build configuration by id.
pub async fn find_build_config(
    pool: &sqlx::SqlitePool,
    id: &str,
) -> Result<Option<BuildConfig>, AppError> {
    let row = sqlx::query_as::<_, BuildConfigRow>(&format!(
        "{} WHERE id = ? AND deleted_at IS NULL",
        SELECT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(BuildConfig::try_from).transpose()
}

/// Upsert the reconciler-owned columns of a build configuration.
///
/// Branch history and dashboard references are left untouched on update
/// and start empty on insert.
pub async fn upsert_build_config(
    pool: &sqlx::SqlitePool,
    config: &BuildConfig,
) -> Result<(), sqlx::Error> {
    let now = now();

    sqlx::query(
        "INSERT INTO build_configs (id, name, description, project_id, created_at, modified_at)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           description = excluded.description,
           project_id = excluded.project_id,
           modified_at = excluded.modified_at,
           deleted_at = NULL",
    )
    .bind(&config.id)
    .bind(&config.name)
    .bind(&config.description)
    .bind(&config.project_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Tombstone a build configuration and purge tombstones past their expiry.
pub async fn delete_build_config(pool: &sqlx::SqlitePool, id: &str) -> Result<u64, sqlx::Error> {
    let now = now();

    let result = sqlx::query(
        "UPDATE build_configs SET deleted_at = ?, modified_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    sqlx::query("DELETE FROM build_configs WHERE deleted_at IS NOT NULL AND deleted_at < ?")
        .bind(now - TOMBSTONE_TTL_SECS)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Overwrite the branch list of a live build configuration.
pub async fn replace_branches(
    pool: &sqlx::SqlitePool,
    config_id: &str,
    branches: &[Branch],
) -> Result<(), AppError> {
    let branches_json = serde_json::to_string(branches)?;

    let result = sqlx::query(
        "UPDATE build_configs SET branches = ?, modified_at = ? WHERE id = ? AND deleted_at IS NULL",
    )
    .bind(&branches_json)
    .bind(now())
    .bind(config_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found_with_id("BuildConfig", config_id));
    }

    Ok(())
}

/// Add a dashboard back-reference to each of the given build configurations.
///
/// Unknown or deleted configuration ids are skipped.
pub async fn add_dashboard_to_build_configs(
    conn: &mut SqliteConnection,
    config_ids: &[String],
    dashboard_id: &str,
) -> Result<(), AppError> {
    for config_id in config_ids {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT dashboard_ids FROM build_configs WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(config_id)
        .fetch_optional(&mut *conn)
        .await?;

        let Some((dashboard_ids_json,)) = row else {
            log::warn!(
                "Dashboard {} references unknown build config {}",
                dashboard_id,
                config_id
            );
            continue;
        };

        let mut dashboard_ids: Vec<String> = serde_json::from_str(&dashboard_ids_json)?;
        if dashboard_ids.iter().any(|id| id == dashboard_id) {
            continue;
        }
        dashboard_ids.push(dashboard_id.to_string());

        sqlx::query("UPDATE build_configs SET dashboard_ids = ?, modified_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&dashboard_ids)?)
            .bind(now())
            .bind(config_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Remove a dashboard back-reference from every build configuration.
pub async fn remove_dashboard_from_build_configs(
    conn: &mut SqliteConnection,
    dashboard_id: &str,
) -> Result<(), AppError> {
    let needle = serde_json::to_string(dashboard_id)?;
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT id, dashboard_ids FROM build_configs WHERE instr(dashboard_ids, ?) > 0",
    )
    .bind(&needle)
    .fetch_all(&mut *conn)
    .await?;

    for (config_id, dashboard_ids_json) in rows {
        let mut dashboard_ids: Vec<String> = serde_json::from_str(&dashboard_ids_json)?;
        dashboard_ids.retain(|id| id != dashboard_id);

        sqlx::query("UPDATE build_configs SET dashboard_ids = ?, modified_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&dashboard_ids)?)
            .bind(now())
            .bind(&config_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::branch::{test_build, BuildStatus};
    use tempfile::{tempdir, TempDir};

    async fn setup_test_db() -> (TempDir, sqlx::SqlitePool) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = db::initialize(&db_path).await.unwrap();
        (dir, pool)
    }

    fn config(id: &str, project_id: &str) -> BuildConfig {
        BuildConfig {
            id: id.to_string(),
            name: format!("{} name", id),
            description: String::new(),
            project_id: project_id.to_string(),
            branches: Vec::new(),
            dashboard_ids: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_upsert_preserves_branches_and_dashboards() {
        let (_dir, pool) = setup_test_db().await;

        upsert_build_config(&pool, &config("Api_Build", "Api")).await.unwrap();

        let branches = vec![Branch::with_builds(
            "master",
            vec![test_build(7, BuildStatus::Success)],
        )];
        replace_branches(&pool, "Api_Build", &branches).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        add_dashboard_to_build_configs(&mut conn, &["Api_Build".to_string()], "dash-1")
            .await
            .unwrap();
        drop(conn);

        let mut renamed = config("Api_Build", "Api");
        renamed.name = "Renamed".to_string();
        upsert_build_config(&pool, &renamed).await.unwrap();

        let stored = find_build_config(&pool, "Api_Build").await.unwrap().unwrap();
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.branches, branches);
        assert_eq!(stored.dashboard_ids, vec!["dash-1".to_string()]);
    }

    #[tokio::test]
    async fn test_replace_branches_unknown_config_is_not_found() {
        let (_dir, pool) = setup_test_db().await;

        let err = replace_branches(&pool, "Missing", &[]).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_deleted_config_is_hidden() {
        let (_dir, pool) = setup_test_db().await;

        upsert_build_config(&pool, &config("A", "P")).await.unwrap();
        upsert_build_config(&pool, &config("B", "P")).await.unwrap();
        assert_eq!(delete_build_config(&pool, "A").await.unwrap(), 1);

        let ids: Vec<String> = list_build_configs(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["B".to_string()]);
        assert!(find_build_config(&pool, "A").await.unwrap().is_none());
        assert!(replace_branches(&pool, "A", &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_dashboard_links_are_deduplicated_and_removable() {
        let (_dir, pool) = setup_test_db().await;

        upsert_build_config(&pool, &config("A", "P")).await.unwrap();
        upsert_build_config(&pool, &config("B", "P")).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let ids = vec!["A".to_string(), "B".to_string(), "Ghost".to_string()];
        add_dashboard_to_build_configs(&mut conn, &ids, "d1").await.unwrap();
        add_dashboard_to_build_configs(&mut conn, &ids, "d1").await.unwrap();
        add_dashboard_to_build_configs(&mut conn, &ids[..1], "d2").await.unwrap();

        remove_dashboard_from_build_configs(&mut conn, "d1").await.unwrap();
        drop(conn);

        let a = find_build_config(&pool, "A").await.unwrap().unwrap();
        let b = find_build_config(&pool, "B").await.unwrap().unwrap();
        assert_eq!(a.dashboard_ids, vec!["d2".to_string()]);
        assert!(b.dashboard_ids.is_empty());
    }
}
