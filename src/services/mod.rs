//! Business logic services.
//!
//! This module contains the TeamCity client, the record store interface,
//! the reconciliation steps and the background sync engine that drives them.

pub mod build_tracker;
pub mod ci_source;
pub mod history;
pub mod mapper;
pub mod reconcile;
pub mod store;
pub mod sync_engine;
pub mod teamcity_client;

#[cfg(test)]
pub(crate) mod testing;

pub use ci_source::CiSource;
pub use store::{RecordStore, SqliteStore};
pub use sync_engine::{SyncConfig, SyncEngine, SyncHandle, Synchronizer};
pub use teamcity_client::{TeamCityClient, TeamCityClientConfig};
