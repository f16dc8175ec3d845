//! Child resource manifests
//!
//! Manifests are strongly typed per child kind and only turned into JSON/YAML
//! at the boundary (API submission or rendering).

pub mod percona;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use serde::{Deserialize, Serialize};

use crate::Error;

pub use percona::{generate, ClusterObservation, PerconaPGCluster};

// =============================================================================
// Kind lookup
// =============================================================================

/// Types with an API version and kind known at compile time.
///
/// This is the only kind registry the controller needs: each child manifest
/// type carries its own constants and the dynamic `ApiResource` is derived
/// from them.
pub trait HasApiResource {
    /// Full API version (e.g., "pgv2.percona.com/v2")
    const API_VERSION: &'static str;
    /// Resource kind (e.g., "PerconaPGCluster")
    const KIND: &'static str;

    /// Build an ApiResource from the type's constants
    fn api_resource() -> ApiResource {
        let (group, version) = match Self::API_VERSION.rsplit_once('/') {
            Some((group, version)) => (group.to_string(), version.to_string()),
            None => (String::new(), Self::API_VERSION.to_string()),
        };
        ApiResource {
            group,
            version,
            api_version: Self::API_VERSION.to_string(),
            kind: Self::KIND.to_string(),
            plural: format!("{}s", Self::KIND.to_lowercase()),
        }
    }
}

// =============================================================================
// Identity
// =============================================================================

/// Name and namespace of a namespaced object
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Object name
    pub name: String,
    /// Object namespace
    pub namespace: String,
}

impl ObjectKey {
    /// Create a key from a name and namespace
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// =============================================================================
// Metadata
// =============================================================================

/// Metadata for generated child manifests
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Owner references (attached at create time)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
}

impl ManifestMeta {
    /// Create metadata for the given identity
    pub fn new(key: &ObjectKey) -> Self {
        Self {
            name: key.name.clone(),
            namespace: key.namespace.clone(),
            labels: BTreeMap::new(),
            owner_references: Vec::new(),
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// Output boundary
// =============================================================================

/// Convert a typed manifest into a DynamicObject for API submission
pub fn to_dynamic_object<T: Serialize>(manifest: &T) -> Result<DynamicObject, Error> {
    let value = serde_json::to_value(manifest)
        .map_err(|e| Error::serialization(format!("failed to serialize manifest: {}", e)))?;
    serde_json::from_value(value)
        .map_err(|e| Error::serialization(format!("failed to build DynamicObject: {}", e)))
}

/// Render a typed manifest as YAML
pub fn render_yaml<T: Serialize>(manifest: &T) -> Result<String, Error> {
    serde_yaml::to_string(manifest)
        .map_err(|e| Error::serialization(format!("failed to render manifest: {}", e)))
}
