//! Status projection
//!
//! Maps what the controller observed about the child PerconaPGCluster onto the
//! status fields of the owning PostgresDatabase. Everything here is pure; the
//! controller decides when (and whether) the result gets written.

use crate::crd::{DatabasePhase, PostgresDatabaseSpec, PostgresDatabaseStatus};
use crate::manifest::{ClusterObservation, ObjectKey};
use crate::Error;

/// Projected status keys that must be cleared when a new status leaves them unset
const PROJECTED_OPTIONAL_FIELDS: &[&str] = &[
    "endpoint",
    "message",
    "credentialsSecretRef",
    "observedRunningVersion",
    "upstreamClusterState",
    "observedGeneration",
];

/// Key of the one status field the controller never writes
const LAST_BACKUP_TIME_FIELD: &str = "lastBackupTime";

/// Message written right after the child was created
pub const MSG_CREATED: &str = "PerconaPGCluster created, waiting for ready status";

/// Message written while the child exists but is not ready
pub const MSG_PROVISIONING: &str = "PerconaPGCluster is being provisioned";

/// Message written once the child reports ready
pub const MSG_READY: &str = "PostgreSQL database is ready for connections";

/// In-cluster read/write service address for a database
pub fn endpoint(key: &ObjectKey) -> String {
    format!("{}-rw.{}.svc.cluster.local", key.name, key.namespace)
}

/// Name of the Secret the Percona operator writes connection credentials to
pub fn credentials_secret_ref(key: &ObjectKey) -> String {
    format!("{}.postgres-secret", key.name)
}

/// What the controller knows about the child at projection time
#[derive(Clone, Copy, Debug)]
pub enum ChildState<'a> {
    /// The child was created (or found to already exist) during this reconcile
    /// and has not been observed yet
    JustCreated,
    /// The child was fetched and observed
    Observed(&'a ClusterObservation),
}

/// Project the child's state onto the PostgresDatabase status.
///
/// `readyReplicas` is taken from the spec once the child reports ready; the
/// actual pod count is not re-observed. `lastBackupTime` is never set here.
pub fn project(
    child: ChildState<'_>,
    spec: &PostgresDatabaseSpec,
    key: &ObjectKey,
    generation: Option<i64>,
) -> PostgresDatabaseStatus {
    let status = match child {
        ChildState::JustCreated => PostgresDatabaseStatus {
            endpoint: Some(endpoint(key)),
            ..PostgresDatabaseStatus::with_phase(DatabasePhase::Creating).message(MSG_CREATED)
        },
        ChildState::Observed(obs) => {
            let (phase, message, ready_replicas) = if obs.is_ready() {
                (DatabasePhase::Ready, MSG_READY, spec.replicas)
            } else {
                (DatabasePhase::Creating, MSG_PROVISIONING, 0)
            };
            PostgresDatabaseStatus {
                endpoint: Some(endpoint(key)),
                credentials_secret_ref: Some(credentials_secret_ref(key)),
                ready_replicas,
                upstream_cluster_state: obs.state.clone(),
                observed_running_version: obs.postgres_version.map(|v| v.to_string()),
                ..PostgresDatabaseStatus::with_phase(phase).message(message)
            }
        }
    };
    status.observed_generation(generation)
}

/// Status written when the spec is rejected
pub fn validation_failed(reason: &str, generation: Option<i64>) -> PostgresDatabaseStatus {
    PostgresDatabaseStatus::with_phase(DatabasePhase::Failed)
        .message(format!("Validation failed: {}", reason))
        .observed_generation(generation)
}

/// Status written when creating the child fails
pub fn create_failed(reason: &str, generation: Option<i64>) -> PostgresDatabaseStatus {
    PostgresDatabaseStatus::with_phase(DatabasePhase::Failed)
        .message(format!("Failed to create PerconaPGCluster: {}", reason))
        .observed_generation(generation)
}

/// Whether writing `next` over `current` would change anything.
///
/// Generation is included so that a spec edit always leaves a trace even
/// when the phase stays put.
pub fn needs_update(current: Option<&PostgresDatabaseStatus>, next: &PostgresDatabaseStatus) -> bool {
    match current {
        None => true,
        Some(current) => {
            current.phase != next.phase
                || current.message != next.message
                || current.endpoint != next.endpoint
                || current.ready_replicas != next.ready_replicas
                || current.credentials_secret_ref != next.credentials_secret_ref
                || current.upstream_cluster_state != next.upstream_cluster_state
                || current.observed_running_version != next.observed_running_version
                || current.observed_generation != next.observed_generation
        }
    }
}

/// JSON merge patch body writing `next` as the whole projected status.
///
/// Unset projected fields are sent as `null` so values from an earlier phase
/// are removed. `lastBackupTime` is left out and keeps its stored value.
pub fn merge_patch(next: &PostgresDatabaseStatus) -> Result<serde_json::Value, Error> {
    let mut body = serde_json::to_value(next)
        .map_err(|e| Error::serialization(format!("failed to serialize status: {}", e)))?;
    if let Some(fields) = body.as_object_mut() {
        fields.remove(LAST_BACKUP_TIME_FIELD);
        for key in PROJECTED_OPTIONAL_FIELDS {
            fields
                .entry(key.to_string())
                .or_insert(serde_json::Value::Null);
        }
    }
    Ok(serde_json::json!({ "status": body }))
}
