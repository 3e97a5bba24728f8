//! Retires batches of geodatabase replicas.
//!
//! A run selects up to `replicaCount` map service replica rows whose
//! `DatasetInfo1` contains the configured service URL, stages them in a
//! session-scoped temporary table, unregisters each one through the
//! geodatabase administration API and reports the retired identifiers.
//!
//! The database and the administration API are reached through the
//! [`ReplicaCatalog`] and [`ReplicaAdministrator`] traits;
//! [`SqlServerCatalog`] and [`ArcpyAdministrator`] are the production
//! implementations.

pub mod administration;
pub mod catalog;
pub mod connection;
pub mod errors;
pub mod job;
pub mod settings;
pub mod sql_server;

#[cfg(test)]
pub(crate) mod test_support;

pub use administration::{ArcpyAdministrator, ReplicaAdministrator};
pub use catalog::{CandidateFilter, CandidateReplica, ReplicaCatalog};
pub use connection::{build_connection_string, ConnectionDescriptor};
pub use errors::{Error, Result};
pub use job::{fetch_candidates, stage_candidates, unregister_all, RetirementJob, RetirementReport};
pub use settings::{JobSettings, SettingsOverrides};
pub use sql_server::SqlServerCatalog;
