//! pgdb - Kubernetes controller for managed PostgreSQL databases
//!
//! Users declare a `PostgresDatabase`; the controller turns it into a Percona
//! `PerconaPGCluster`, creates that cluster once, and keeps the database's
//! status in line with the cluster's readiness.
//!
//! # Modules
//!
//! - [`crd`] - PostgresDatabase Custom Resource Definition, defaulting and validation
//! - [`manifest`] - Typed PerconaPGCluster manifest and its generator
//! - [`status`] - Projection of the cluster's state onto the database status
//! - [`controller`] - Kubernetes controller reconciliation logic
//! - [`config`] - Platform defaults (image registry, tags, storage class)
//! - [`error`] - Error types for the controller

#![deny(missing_docs)]

use std::time::Duration;

pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod manifest;
pub mod status;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================

/// Delay before a PostgresDatabase is reconciled again, in seconds
pub const REQUEUE_SECS: u64 = 30;

/// Delay before a PostgresDatabase is reconciled again
///
/// Applies to every branch that leaves the database in place, Ready included.
pub const REQUEUE_INTERVAL: Duration = Duration::from_secs(REQUEUE_SECS);

/// Field manager name for writes made by the controller
pub const FIELD_MANAGER: &str = "postgres-database-controller";
