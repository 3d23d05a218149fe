//! In-memory fakes for the CI source and the record store.
//!
//! Both record the calls made against them and can be told to fail
//! specific operations. Clones share state, so a test keeps one handle
//! while the code under test owns another.

use crate::error::AppError;
use crate::models::{Branch, BuildConfig, Dashboard, DashboardBuildConfig, Project};
use crate::services::ci_source::CiSource;
use crate::services::store::RecordStore;
use crate::services::teamcity_client::{TeamCityBuild, TeamCityBuildType, TeamCityProject};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Recorded write against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    UpsertProject(String),
    DeleteProject(String),
    UpsertBuildConfig(String),
    DeleteBuildConfig(String),
    ReplaceBranches(String),
}

#[derive(Default)]
struct MemoryStoreState {
    projects: BTreeMap<String, Project>,
    build_configs: BTreeMap<String, BuildConfig>,
    dashboards: Vec<Dashboard>,
    calls: Vec<StoreCall>,
    fail_list_projects: bool,
    fail_list_build_configs: bool,
    fail_list_dashboards: bool,
    fail_upsert_ids: HashSet<String>,
    fail_delete_ids: HashSet<String>,
    fail_find_ids: HashSet<String>,
    fail_replace_ids: HashSet<String>,
}

/// Fake record store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_project(&self, id: &str) {
        self.inner.lock().projects.insert(id.to_string(), project(id));
    }

    pub fn insert_build_config(&self, config: BuildConfig) {
        self.inner
            .lock()
            .build_configs
            .insert(config.id.clone(), config);
    }

    /// Add a dashboard and link it from the referenced build configurations.
    pub fn insert_dashboard(&self, id: &str, config_ids: &[&str]) {
        let mut state = self.inner.lock();
        for config_id in config_ids {
            if let Some(config) = state.build_configs.get_mut(*config_id) {
                config.dashboard_ids.push(id.to_string());
            }
        }
        state.dashboards.push(Dashboard {
            id: id.to_string(),
            name: id.to_string(),
            build_configs: config_ids
                .iter()
                .map(|c| DashboardBuildConfig {
                    id: c.to_string(),
                    abbreviation: c.to_string(),
                })
                .collect(),
        });
    }

    pub fn project_ids(&self) -> Vec<String> {
        self.inner.lock().projects.keys().cloned().collect()
    }

    pub fn build_config_ids(&self) -> Vec<String> {
        self.inner.lock().build_configs.keys().cloned().collect()
    }

    pub fn build_config(&self, id: &str) -> Option<BuildConfig> {
        self.inner.lock().build_configs.get(id).cloned()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().calls.clone()
    }

    pub fn fail_list_projects(&self) {
        self.inner.lock().fail_list_projects = true;
    }

    pub fn fail_list_build_configs(&self) {
        self.inner.lock().fail_list_build_configs = true;
    }

    pub fn fail_list_dashboards(&self) {
        self.inner.lock().fail_list_dashboards = true;
    }

    pub fn fail_upsert(&self, id: &str) {
        self.inner.lock().fail_upsert_ids.insert(id.to_string());
    }

    pub fn fail_delete(&self, id: &str) {
        self.inner.lock().fail_delete_ids.insert(id.to_string());
    }

    pub fn fail_find(&self, id: &str) {
        self.inner.lock().fail_find_ids.insert(id.to_string());
    }

    pub fn fail_replace_branches(&self, id: &str) {
        self.inner.lock().fail_replace_ids.insert(id.to_string());
    }
}

fn injected(operation: &str, id: &str) -> AppError {
    AppError::database_with_op(format!("injected failure for {}", id), operation)
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert_project(&self, project: &Project) -> Result<(), AppError> {
        let mut state = self.inner.lock();
        state.calls.push(StoreCall::UpsertProject(project.id.clone()));
        if state.fail_upsert_ids.contains(&project.id) {
            return Err(injected("upsert_project", &project.id));
        }
        state.projects.insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn delete_project(&self, id: &str) -> Result<(), AppError> {
        let mut state = self.inner.lock();
        state.calls.push(StoreCall::DeleteProject(id.to_string()));
        if state.fail_delete_ids.contains(id) {
            return Err(injected("delete_project", id));
        }
        state
            .projects
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AppError::not_found_with_id("Project", id))
    }

    async fn list_projects(&self) -> Result<Vec<Project>, AppError> {
        let state = self.inner.lock();
        if state.fail_list_projects {
            return Err(AppError::database("injected list_projects failure"));
        }
        Ok(state.projects.values().cloned().collect())
    }

    async fn upsert_build_config(&self, config: &BuildConfig) -> Result<(), AppError> {
        let mut state = self.inner.lock();
        state
            .calls
            .push(StoreCall::UpsertBuildConfig(config.id.clone()));
        if state.fail_upsert_ids.contains(&config.id) {
            return Err(injected("upsert_build_config", &config.id));
        }
        match state.build_configs.get_mut(&config.id) {
            Some(existing) => {
                existing.name = config.name.clone();
                existing.description = config.description.clone();
                existing.project_id = config.project_id.clone();
            }
            None => {
                let mut fresh = config.clone();
                fresh.branches.clear();
                fresh.dashboard_ids.clear();
                state.build_configs.insert(config.id.clone(), fresh);
            }
        }
        Ok(())
    }

    async fn delete_build_config(&self, id: &str) -> Result<(), AppError> {
        let mut state = self.inner.lock();
        state.calls.push(StoreCall::DeleteBuildConfig(id.to_string()));
        if state.fail_delete_ids.contains(id) {
            return Err(injected("delete_build_config", id));
        }
        state
            .build_configs
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AppError::not_found_with_id("BuildConfig", id))
    }

    async fn list_build_configs(&self) -> Result<Vec<BuildConfig>, AppError> {
        let state = self.inner.lock();
        if state.fail_list_build_configs {
            return Err(AppError::database("injected list_build_configs failure"));
        }
        Ok(state.build_configs.values().cloned().collect())
    }

    async fn find_build_config_by_id(&self, id: &str) -> Result<Option<BuildConfig>, AppError> {
        let state = self.inner.lock();
        if state.fail_find_ids.contains(id) {
            return Err(injected("find_build_config_by_id", id));
        }
        Ok(state.build_configs.get(id).cloned())
    }

    async fn replace_branches(&self, config_id: &str, branches: &[Branch]) -> Result<(), AppError> {
        let mut state = self.inner.lock();
        state
            .calls
            .push(StoreCall::ReplaceBranches(config_id.to_string()));
        if state.fail_replace_ids.contains(config_id) {
            return Err(injected("replace_branches", config_id));
        }
        match state.build_configs.get_mut(config_id) {
            Some(config) => {
                config.branches = branches.to_vec();
                Ok(())
            }
            None => Err(AppError::not_found_with_id("BuildConfig", config_id)),
        }
    }

    async fn list_dashboards(&self) -> Result<Vec<Dashboard>, AppError> {
        let state = self.inner.lock();
        if state.fail_list_dashboards {
            return Err(AppError::database("injected list_dashboards failure"));
        }
        Ok(state.dashboards.clone())
    }
}

/// Recorded request against the CI source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CiCall {
    ListProjects,
    ListBuildConfigs,
    ListActiveBuilds,
    GetBuild(i64),
    ListBuildsForConfig(String, u32),
}

#[derive(Default)]
struct FakeCiState {
    projects: Vec<TeamCityProject>,
    build_types: Vec<TeamCityBuildType>,
    active_builds: Vec<TeamCityBuild>,
    builds_by_id: HashMap<i64, TeamCityBuild>,
    history: HashMap<String, Vec<TeamCityBuild>>,
    calls: Vec<CiCall>,
    fail_projects: bool,
    fail_build_types: bool,
    fail_active_builds: bool,
    fail_history_ids: HashSet<String>,
}

/// Fake CI source.
#[derive(Clone, Default)]
pub struct FakeCiSource {
    inner: Arc<Mutex<FakeCiState>>,
}

impl FakeCiSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_projects(&self, ids: &[&str]) {
        self.inner.lock().projects = ids
            .iter()
            .map(|id| TeamCityProject {
                id: id.to_string(),
                name: format!("{} project", id),
                description: String::new(),
                parent_project_id: "_Root".to_string(),
            })
            .collect();
    }

    /// Set build types as `(id, project_id)` pairs.
    pub fn set_build_types(&self, build_types: &[(&str, &str)]) {
        self.inner.lock().build_types = build_types
            .iter()
            .map(|(id, project_id)| TeamCityBuildType {
                id: id.to_string(),
                name: format!("{} build", id),
                description: String::new(),
                project_id: project_id.to_string(),
            })
            .collect();
    }

    pub fn set_active_builds(&self, builds: Vec<TeamCityBuild>) {
        self.inner.lock().active_builds = builds;
    }

    /// Register the state `get_build_by_id` returns for a build.
    pub fn set_build(&self, build: TeamCityBuild) {
        self.inner.lock().builds_by_id.insert(build.id, build);
    }

    pub fn set_history(&self, config_id: &str, builds: Vec<TeamCityBuild>) {
        self.inner
            .lock()
            .history
            .insert(config_id.to_string(), builds);
    }

    pub fn fail_projects(&self) {
        self.inner.lock().fail_projects = true;
    }

    pub fn fail_build_types(&self) {
        self.inner.lock().fail_build_types = true;
    }

    pub fn fail_active_builds(&self, fail: bool) {
        self.inner.lock().fail_active_builds = fail;
    }

    pub fn fail_history(&self, config_id: &str) {
        self.inner
            .lock()
            .fail_history_ids
            .insert(config_id.to_string());
    }

    pub fn calls(&self) -> Vec<CiCall> {
        self.inner.lock().calls.clone()
    }
}

#[async_trait]
impl CiSource for FakeCiSource {
    async fn list_projects(&self) -> Result<Vec<TeamCityProject>, AppError> {
        let mut state = self.inner.lock();
        state.calls.push(CiCall::ListProjects);
        if state.fail_projects {
            return Err(AppError::network("injected projects failure"));
        }
        Ok(state.projects.clone())
    }

    async fn list_build_configs(&self) -> Result<Vec<TeamCityBuildType>, AppError> {
        let mut state = self.inner.lock();
        state.calls.push(CiCall::ListBuildConfigs);
        if state.fail_build_types {
            return Err(AppError::network("injected build types failure"));
        }
        Ok(state.build_types.clone())
    }

    async fn list_active_builds(&self) -> Result<Vec<TeamCityBuild>, AppError> {
        let mut state = self.inner.lock();
        state.calls.push(CiCall::ListActiveBuilds);
        if state.fail_active_builds {
            return Err(AppError::network("injected running builds failure"));
        }
        Ok(state.active_builds.clone())
    }

    async fn get_build_by_id(&self, build_id: i64) -> Result<TeamCityBuild, AppError> {
        let mut state = self.inner.lock();
        state.calls.push(CiCall::GetBuild(build_id));
        state
            .builds_by_id
            .get(&build_id)
            .cloned()
            .ok_or_else(|| AppError::ci_api_full("Resource not found", 404, "/builds"))
    }

    async fn list_builds_for_config(
        &self,
        config_id: &str,
        limit: u32,
    ) -> Result<Vec<TeamCityBuild>, AppError> {
        let mut state = self.inner.lock();
        state
            .calls
            .push(CiCall::ListBuildsForConfig(config_id.to_string(), limit));
        if state.fail_history_ids.contains(config_id) {
            return Err(AppError::network("injected history failure"));
        }
        Ok(state.history.get(config_id).cloned().unwrap_or_default())
    }
}

pub fn project(id: &str) -> Project {
    Project {
        id: id.to_string(),
        name: format!("{} project", id),
        description: String::new(),
        parent_project_id: "_Root".to_string(),
    }
}

pub fn build_config(id: &str, project_id: &str) -> BuildConfig {
    BuildConfig {
        id: id.to_string(),
        name: format!("{} build", id),
        description: String::new(),
        project_id: project_id.to_string(),
        branches: Vec::new(),
        dashboard_ids: Vec::new(),
    }
}

/// A TeamCity build record; `state` is `running` or `finished`.
pub fn tc_build(id: i64, config_id: &str, branch: &str, state: &str) -> TeamCityBuild {
    TeamCityBuild {
        id,
        build_type_id: config_id.to_string(),
        number: id.to_string(),
        status: Some(if state == "running" { "SUCCESS" } else { "FAILURE" }.to_string()),
        state: state.to_string(),
        branch_name: branch.to_string(),
        percentage_complete: (state == "running").then_some(40),
        status_text: String::new(),
        start_date: None,
        finish_date: None,
    }
}
