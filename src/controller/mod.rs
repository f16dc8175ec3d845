//! Controller for PostgresDatabase resources
//!
//! Reconciliation follows the usual observe-decide-act loop: read the
//! database, read its PerconaPGCluster, create the cluster if missing and
//! report its state back into the database status.

mod database;

pub use database::{
    error_policy, reconcile, Context, ContextBuilder, CreateOutcome, KubeClient, KubeClientImpl,
};
