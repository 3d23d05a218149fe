//! Data models for the local mirror.
//!
//! Each module holds a record type together with the SQLite queries that
//! read and write it.

pub mod branch;
pub mod build_config;
pub mod dashboard;
pub mod project;

pub use branch::{Branch, Build, BuildStatus, MAX_BRANCH_BUILDS};
pub use build_config::BuildConfig;
pub use dashboard::{Dashboard, DashboardBuildConfig};
pub use project::Project;
