//! TeamCity REST API client.
//!
//! Talks JSON to `/app/rest` (bearer token) or `/guestAuth/app/rest`
//! (no token), and exposes the API records the sync engine consumes.

use crate::error::AppError;
use crate::services::ci_source::CiSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Fields requested for every build, so list and single-build responses
/// carry the same shape.
const BUILD_FIELDS: &str = "id,buildTypeId,number,status,state,branchName,percentageComplete,statusText,startDate,finishDate";

/// Page size for the running-builds query. TeamCity caps unpaged lists at 100.
pub const RUNNING_BUILDS_LIMIT: u32 = 1000;

/// TeamCity API client configuration.
#[derive(Debug, Clone)]
pub struct TeamCityClientConfig {
    /// Base URL of the TeamCity server (e.g., `https://teamcity.example.com`).
    pub base_url: String,

    /// Access token; guest access is used when absent.
    pub token: Option<String>,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for TeamCityClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// TeamCity API client.
#[derive(Debug, Clone)]
pub struct TeamCityClient {
    client: Client,
    config: TeamCityClientConfig,
}

/// TeamCity project from API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamCityProject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parent_project_id: String,
}

/// TeamCity build configuration ("build type") from API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamCityBuildType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub project_id: String,
}

/// TeamCity build from API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamCityBuild {
    pub id: i64,
    pub build_type_id: String,
    #[serde(default)]
    pub number: String,
    /// `SUCCESS`, `FAILURE` or `UNKNOWN`.
    #[serde(default)]
    pub status: Option<String>,
    /// `queued`, `running` or `finished`.
    #[serde(default)]
    pub state: String,
    #[serde(default = "default_branch_name")]
    pub branch_name: String,
    #[serde(default)]
    pub percentage_complete: Option<i32>,
    #[serde(default)]
    pub status_text: String,
    #[serde(default, deserialize_with = "teamcity_date::deserialize_option")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "teamcity_date::deserialize_option")]
    pub finish_date: Option<DateTime<Utc>>,
}

/// Branch name TeamCity reports for builds of the default branch.
pub const DEFAULT_BRANCH_NAME: &str = "<default>";

fn default_branch_name() -> String {
    DEFAULT_BRANCH_NAME.to_string()
}

#[derive(Debug, Deserialize)]
struct ProjectList {
    #[serde(default)]
    project: Vec<TeamCityProject>,
}

#[derive(Debug, Deserialize)]
struct BuildTypeList {
    #[serde(default, rename = "buildType")]
    build_type: Vec<TeamCityBuildType>,
}

#[derive(Debug, Deserialize)]
struct BuildList {
    #[serde(default)]
    build: Vec<TeamCityBuild>,
}

/// TeamCity timestamps look like `20240115T103000+0000`.
pub mod teamcity_date {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};

    const FORMAT: &str = "%Y%m%dT%H%M%S%z";

    pub fn parse(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_str(s, FORMAT)
            .or_else(|_| DateTime::parse_from_rfc3339(s))
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) if s.is_empty() => Ok(None),
            Some(s) => {
                let parsed = parse(&s);
                if parsed.is_none() {
                    log::debug!("Ignoring unparseable TeamCity date: {}", s);
                }
                Ok(parsed)
            }
        }
    }
}

impl TeamCityClient {
    /// Create a new TeamCity client.
    pub fn new(config: TeamCityClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        if let Some(token) = &config.token {
            let token_value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| AppError::authentication("Invalid token format"))?;
            headers.insert(header::AUTHORIZATION, token_value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Build the full URL for a REST endpoint.
    fn api_url(&self, path: &str) -> String {
        let rest_root = if self.config.token.is_some() {
            "/app/rest"
        } else {
            "/guestAuth/app/rest"
        };
        format!(
            "{}{}{}",
            self.config.base_url.trim_end_matches('/'),
            rest_root,
            path
        )
    }

    /// Handle API response errors.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
        endpoint: &str,
    ) -> Result<T, AppError> {
        let status = response.status();

        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| AppError::internal(format!("Failed to parse response: {}", e)));
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::authentication(format!(
                "TeamCity rejected credentials for {} ({})",
                endpoint,
                status.as_u16()
            )));
        }

        let status_code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = match status {
            StatusCode::NOT_FOUND => "Resource not found".to_string(),
            StatusCode::TOO_MANY_REQUESTS => "Rate limit exceeded".to_string(),
            _ if body.trim().is_empty() => format!("Request failed ({})", status_code),
            // TeamCity error bodies are plain text; keep the first line
            _ => body.lines().next().unwrap_or_default().to_string(),
        };

        Err(AppError::ci_api_full(message, status_code, endpoint))
    }

    /// Make a GET request and decode the JSON body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, AppError> {
        let url = self.api_url(endpoint);
        let response = self.client.get(&url).query(query).send().await?;
        self.handle_response(response, endpoint).await
    }

    /// List all projects, including the `_Root` project.
    pub async fn list_projects(&self) -> Result<Vec<TeamCityProject>, AppError> {
        let list: ProjectList = self
            .get_json(
                "/projects",
                &[("fields", "project(id,name,description,parentProjectId)")],
            )
            .await?;
        Ok(list.project)
    }

    /// List all build configurations.
    pub async fn list_build_types(&self) -> Result<Vec<TeamCityBuildType>, AppError> {
        let list: BuildTypeList = self
            .get_json(
                "/buildTypes",
                &[("fields", "buildType(id,name,description,projectId)")],
            )
            .await?;
        Ok(list.build_type)
    }

    /// List builds currently running on any branch.
    pub async fn list_running_builds(&self) -> Result<Vec<TeamCityBuild>, AppError> {
        let locator = running_builds_locator(RUNNING_BUILDS_LIMIT);
        let fields = format!("build({})", BUILD_FIELDS);
        let list: BuildList = self
            .get_json(
                "/builds",
                &[("locator", locator.as_str()), ("fields", fields.as_str())],
            )
            .await?;
        Ok(list.build)
    }

    /// Get a single build by id.
    pub async fn get_build(&self, build_id: i64) -> Result<TeamCityBuild, AppError> {
        let endpoint = format!("/builds/id:{}", build_id);
        self.get_json(&endpoint, &[("fields", BUILD_FIELDS)]).await
    }

    /// Get up to `limit` recent builds of a build configuration, running or
    /// finished, across all branches.
    pub async fn list_builds_for_build_type(
        &self,
        build_type_id: &str,
        limit: u32,
    ) -> Result<Vec<TeamCityBuild>, AppError> {
        let locator = build_type_locator(build_type_id, limit);
        let fields = format!("build({})", BUILD_FIELDS);
        let list: BuildList = self
            .get_json("/builds", &[("locator", locator.as_str()), ("fields", fields.as_str())])
            .await?;
        Ok(list.build)
    }
}

fn running_builds_locator(limit: u32) -> String {
    format!("running:true,branch:default:any,count:{}", limit)
}

fn build_type_locator(build_type_id: &str, limit: u32) -> String {
    format!(
        "buildType:(id:{}),branch:default:any,running:any,count:{}",
        build_type_id, limit
    )
}

#[async_trait]
impl CiSource for TeamCityClient {
    async fn list_projects(&self) -> Result<Vec<TeamCityProject>, AppError> {
        TeamCityClient::list_projects(self).await
    }

    async fn list_build_configs(&self) -> Result<Vec<TeamCityBuildType>, AppError> {
        self.list_build_types().await
    }

    async fn list_active_builds(&self) -> Result<Vec<TeamCityBuild>, AppError> {
        self.list_running_builds().await
    }

    async fn get_build_by_id(&self, build_id: i64) -> Result<TeamCityBuild, AppError> {
        self.get_build(build_id).await
    }

    async fn list_builds_for_config(
        &self,
        config_id: &str,
        limit: u32,
    ) -> Result<Vec<TeamCityBuild>, AppError> {
        self.list_builds_for_build_type(config_id, limit).await
    }
}
