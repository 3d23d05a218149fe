//! Branch build history model.
//!
//! A branch keeps the most recent builds of one VCS branch of a build
//! configuration, newest first, capped at [`MAX_BRANCH_BUILDS`]. The
//! `is_running` flag is always derived from the builds it holds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of builds kept per branch.
pub const MAX_BRANCH_BUILDS: usize = 12;

/// Status of a single build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Running,
    Success,
    Failure,
    #[serde(other)]
    Unknown,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Running => "running",
            BuildStatus::Success => "success",
            BuildStatus::Failure => "failure",
            BuildStatus::Unknown => "unknown",
        }
    }
}

/// A build as stored in a branch history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    /// TeamCity build id.
    pub id: i64,

    /// Build number as displayed by TeamCity (e.g. "1.4.112").
    pub number: String,

    pub status: BuildStatus,

    pub status_text: String,

    /// Percentage complete (0-100), meaningful while running.
    pub progress: i32,

    pub start_date: Option<DateTime<Utc>>,

    /// Finish time, or the time the build was last observed while still open.
    pub finish_date: DateTime<Utc>,
}

impl Build {
    pub fn is_running(&self) -> bool {
        self.status == BuildStatus::Running
    }
}

/// Named line of build history within a build configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredBranch")]
pub struct Branch {
    name: String,
    builds: Vec<Build>,
    is_running: bool,
}

/// Serialized shape of a branch. The stored `isRunning` value is ignored
/// and recomputed on load.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredBranch {
    name: String,
    #[serde(default)]
    builds: Vec<Build>,
}

impl From<StoredBranch> for Branch {
    fn from(stored: StoredBranch) -> Self {
        Branch::with_builds(stored.name, stored.builds)
    }
}

impl Branch {
    /// Create an empty branch.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            builds: Vec::new(),
            is_running: false,
        }
    }

    /// Create a branch from an unordered list of builds, keeping the newest
    /// [`MAX_BRANCH_BUILDS`].
    pub fn with_builds(name: impl Into<String>, builds: Vec<Build>) -> Self {
        let mut branch = Self {
            name: name.into(),
            builds,
            is_running: false,
        };
        branch.normalize();
        branch
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builds, newest first.
    pub fn builds(&self) -> &[Build] {
        &self.builds
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// Merge a build into the history.
    ///
    /// An entry with the same id is replaced in place (status and progress
    /// updates of the same build); otherwise the build is prepended.
    pub fn merge(&mut self, build: Build) {
        match self.builds.iter_mut().find(|b| b.id == build.id) {
            Some(existing) => *existing = build,
            None => self.builds.insert(0, build),
        }
        self.normalize();
    }

    fn normalize(&mut self) {
        clean_builds(&mut self.builds);
        self.is_running = self.builds.iter().any(Build::is_running);
    }
}

/// Sort builds newest first (by id, descending) and drop everything past
/// [`MAX_BRANCH_BUILDS`].
pub fn clean_builds(builds: &mut Vec<Build>) {
    builds.sort_by(|a, b| b.id.cmp(&a.id));
    builds.truncate(MAX_BRANCH_BUILDS);
}

/// Merge a build into the named branch, appending a new branch if none
/// has that name yet.
pub fn merge_into_branches(branches: &mut Vec<Branch>, branch_name: &str, build: Build) {
    match branches.iter_mut().find(|b| b.name == branch_name) {
        Some(branch) => branch.merge(build),
        None => {
            let mut branch = Branch::new(branch_name);
            branch.merge(build);
            branches.push(branch);
        }
    }
}

#[cfg(test)]
pub(crate) fn test_build(id: i64, status: BuildStatus) -> Build {
    let finish = DateTime::from_timestamp(1_700_000_000 + id, 0).unwrap();
    Build {
        id,
        number: format!("1.0.{}", id),
        status,
        status_text: String::new(),
        progress: if status == BuildStatus::Running { 50 } else { 100 },
        start_date: Some(finish),
        finish_date: finish,
    }
}
