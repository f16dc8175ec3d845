//! Error types for the PostgresDatabase controller

use thiserror::Error;

/// Main error type for controller operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// A spec field failed validation
    #[error("validation error: {field}: {reason}")]
    Validation {
        /// Wire name of the offending field (e.g. `resourceRequirements.limits.cpu`)
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Creating the child PerconaPGCluster failed
    #[error("failed to create PerconaPGCluster: {0}")]
    ChildCreate(String),

    /// Persisting the status subresource failed
    #[error("status write failed: {0}")]
    StatusWrite(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The object is missing a name, namespace or uid needed to act on it
    #[error("missing identity: {0}")]
    MissingIdentity(String),

    /// The reconcile was interrupted by shutdown
    #[error("reconcile cancelled")]
    Cancelled,
}

impl Error {
    /// Create a validation error for the given field
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a child creation error with the given message
    pub fn child_create(msg: impl Into<String>) -> Self {
        Self::ChildCreate(msg.into())
    }

    /// Create a status write error with the given message
    pub fn status_write(msg: impl Into<String>) -> Self {
        Self::StatusWrite(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a missing identity error with the given message
    pub fn missing_identity(msg: impl Into<String>) -> Self {
        Self::MissingIdentity(msg.into())
    }

    /// Whether the scheduler should retry this error with backoff.
    ///
    /// Validation errors need a spec change, everything else may succeed later.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Validation { .. } | Self::MissingIdentity(_))
    }

    /// Whether this error came from a shutdown signal rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
