//! Supporting types for the PostgresDatabase CRD

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default CPU request applied when `resourceRequirements` is omitted
pub const DEFAULT_REQUEST_CPU: &str = "100m";
/// Default memory request applied when `resourceRequirements` is omitted
pub const DEFAULT_REQUEST_MEMORY: &str = "256Mi";
/// Default CPU limit applied when `resourceRequirements` is omitted
pub const DEFAULT_LIMIT_CPU: &str = "500m";
/// Default memory limit applied when `resourceRequirements` is omitted
pub const DEFAULT_LIMIT_MEMORY: &str = "1Gi";

/// CPU and memory quantities
///
/// An empty string means "not set".
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceList {
    /// CPU quantity (e.g., "100m", "1")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    #[schemars(regex(pattern = r"^([0-9]+m?)?$"))]
    pub cpu: String,

    /// Memory quantity (e.g., "256Mi", "1Gi")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    #[schemars(regex(pattern = r"^([0-9]+(Ki|Mi|Gi|Ti|Pi|Ei))?$"))]
    pub memory: String,
}

impl ResourceList {
    /// Create a resource list from a CPU and memory quantity
    pub fn new(cpu: impl Into<String>, memory: impl Into<String>) -> Self {
        Self {
            cpu: cpu.into(),
            memory: memory.into(),
        }
    }

    /// Returns true if neither quantity is set
    pub fn is_empty(&self) -> bool {
        self.cpu.is_empty() && self.memory.is_empty()
    }
}

/// Resource requests and limits for database instances
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ResourceRequirements {
    /// Resource requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceList>,

    /// Resource limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceList>,
}

impl ResourceRequirements {
    /// The platform's fixed default requests/limits
    pub fn platform_default() -> Self {
        Self {
            requests: Some(ResourceList::new(DEFAULT_REQUEST_CPU, DEFAULT_REQUEST_MEMORY)),
            limits: Some(ResourceList::new(DEFAULT_LIMIT_CPU, DEFAULT_LIMIT_MEMORY)),
        }
    }
}

/// Lifecycle phase of a PostgresDatabase
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum DatabasePhase {
    /// Not reconciled yet
    #[default]
    Pending,
    /// Child cluster exists and is converging
    Creating,
    /// Child cluster reports ready
    Ready,
    /// Validation or child creation failed
    Failed,
}

impl std::fmt::Display for DatabasePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Creating => write!(f, "Creating"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}
