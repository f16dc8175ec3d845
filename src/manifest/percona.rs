//! PerconaPGCluster manifest types and generation
//!
//! Typed representation of the Percona operator's `pgv2.percona.com/v2`
//! PerconaPGCluster, plus the pure function that builds one from a
//! PostgresDatabase spec.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, PodAffinityTerm, PodAntiAffinity, ResourceRequirements as K8sResourceRequirements,
    WeightedPodAffinityTerm,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::DynamicObject;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use super::{HasApiResource, ManifestMeta, ObjectKey};
use crate::config::PlatformDefaults;
use crate::crd::{PostgresDatabaseSpec, ResourceList, ResourceRequirements};

/// PostgreSQL image name (relative to the registry)
pub const POSTGRES_IMAGE_NAME: &str = "percona-distribution-postgresql";

/// Name of the single instance group
pub const INSTANCE_GROUP_NAME: &str = "instance1";

/// Name of the single pgBackRest repository
pub const BACKUP_REPO_NAME: &str = "repo1";

/// Weekly full backup, Saturday at midnight
pub const FULL_BACKUP_SCHEDULE: &str = "0 0 * * 6";

/// Provenance label key/value set on every generated cluster
pub const LABEL_CREATED_BY: (&str, &str) = ("created-by", "postgres-database-controller");

/// Application label key/value set on every generated cluster
pub const LABEL_APP: (&str, &str) = ("app", "postgres-database");

/// Pod label database instances spread away from
pub const ANTI_AFFINITY_LABEL: (&str, &str) = ("postgres-operator.crunchydata.com/data", "postgres");

/// Pod label PgBouncer pods spread away from
pub const PROXY_ANTI_AFFINITY_LABEL: (&str, &str) =
    ("postgres-operator.crunchydata.com/role", "pgbouncer");

/// Topology key for spreading pods across hosts
pub const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

/// Annotation on the child carrying the upstream readiness state
pub const STATE_ANNOTATION: &str = "postgres-operator.crunchydata.com/state";

/// Annotation value that means the cluster is ready
pub const STATE_READY: &str = "Ready";

// =============================================================================
// PerconaPGCluster
// =============================================================================

/// Percona PerconaPGCluster resource
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerconaPGCluster {
    /// API version
    #[serde(default = "PerconaPGCluster::default_api_version")]
    pub api_version: String,
    /// Resource kind
    #[serde(default = "PerconaPGCluster::default_kind")]
    pub kind: String,
    /// Resource metadata
    pub metadata: ManifestMeta,
    /// Cluster specification
    pub spec: PerconaPGClusterSpec,
}

impl HasApiResource for PerconaPGCluster {
    const API_VERSION: &'static str = "pgv2.percona.com/v2";
    const KIND: &'static str = "PerconaPGCluster";
}

impl PerconaPGCluster {
    fn default_api_version() -> String {
        <Self as HasApiResource>::API_VERSION.to_string()
    }
    fn default_kind() -> String {
        <Self as HasApiResource>::KIND.to_string()
    }

    /// Create a new PerconaPGCluster
    pub fn new(metadata: ManifestMeta, spec: PerconaPGClusterSpec) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata,
            spec,
        }
    }
}

/// PerconaPGCluster spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerconaPGClusterSpec {
    /// Percona operator CR version
    pub cr_version: String,
    /// PostgreSQL image reference
    pub image: String,
    /// PostgreSQL major version
    pub postgres_version: u32,
    /// Instance groups
    pub instances: Vec<InstanceSpec>,
    /// Connection pooling proxy
    pub proxy: ProxySpec,
    /// Backup configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backups: Option<BackupsSpec>,
    /// PMM monitoring configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmm: Option<PmmSpec>,
}

/// An instance group
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSpec {
    /// Group name
    pub name: String,
    /// Number of PostgreSQL pods
    pub replicas: u32,
    /// Data volume claim template
    pub data_volume_claim_spec: VolumeClaimSpec,
    /// Container resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<K8sResourceRequirements>,
    /// Pod scheduling affinity
    pub affinity: Affinity,
}

/// Data volume claim template
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeClaimSpec {
    /// Access modes
    pub access_modes: Vec<String>,
    /// Storage requests
    pub resources: VolumeResources,
    /// StorageClass name
    pub storage_class_name: String,
}

/// Volume resource requests
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct VolumeResources {
    /// Requested quantities (only `storage`)
    pub requests: BTreeMap<String, String>,
}

/// Proxy configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProxySpec {
    /// PgBouncer deployment
    pub pg_bouncer: PgBouncerSpec,
}

/// PgBouncer configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PgBouncerSpec {
    /// Number of PgBouncer pods
    pub replicas: u32,
    /// PgBouncer image reference
    pub image: String,
    /// Pod scheduling affinity
    pub affinity: Affinity,
}

/// Backup configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BackupsSpec {
    /// pgBackRest configuration
    pub pgbackrest: PgBackRestSpec,
}

/// pgBackRest configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PgBackRestSpec {
    /// pgBackRest image reference
    pub image: String,
    /// Backup repositories
    pub repos: Vec<BackupRepo>,
}

/// A pgBackRest repository
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BackupRepo {
    /// Repository name
    pub name: String,
    /// Backup schedules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedules: Option<BackupSchedules>,
}

/// Cron schedules for a repository
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BackupSchedules {
    /// Full backup schedule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full: Option<String>,
}

/// PMM configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PmmSpec {
    /// Whether PMM is enabled
    pub enabled: bool,
    /// PMM client image reference
    pub image: String,
    /// PMM server host
    pub server_host: String,
}

// =============================================================================
// Generation
// =============================================================================

/// Build the PerconaPGCluster for a PostgresDatabase.
///
/// Pure and deterministic: the same inputs always produce the same manifest.
/// The spec must already be defaulted and validated; generation itself cannot
/// fail. Owner references are attached by the caller at create time.
pub fn generate(
    spec: &PostgresDatabaseSpec,
    defaults: &PlatformDefaults,
    key: &ObjectKey,
) -> PerconaPGCluster {
    let metadata = ManifestMeta::new(key)
        .with_label(LABEL_CREATED_BY.0, LABEL_CREATED_BY.1)
        .with_label(LABEL_APP.0, LABEL_APP.1);

    let instance = InstanceSpec {
        name: INSTANCE_GROUP_NAME.to_string(),
        replicas: spec.replicas,
        data_volume_claim_spec: VolumeClaimSpec {
            access_modes: vec!["ReadWriteOnce".to_string()],
            resources: VolumeResources {
                requests: BTreeMap::from([("storage".to_string(), spec.storage_size.clone())]),
            },
            storage_class_name: defaults.storage_class.clone(),
        },
        resources: spec.resource_requirements.as_ref().and_then(build_resources),
        affinity: preferred_host_anti_affinity(ANTI_AFFINITY_LABEL),
    };

    let proxy = ProxySpec {
        pg_bouncer: PgBouncerSpec {
            replicas: spec.replicas,
            image: defaults.image(&defaults.pgbouncer_image),
            affinity: preferred_host_anti_affinity(PROXY_ANTI_AFFINITY_LABEL),
        },
    };

    let backups = spec.backup_enabled.then(|| BackupsSpec {
        pgbackrest: PgBackRestSpec {
            image: defaults.image(&defaults.pgbackrest_image),
            repos: vec![BackupRepo {
                name: BACKUP_REPO_NAME.to_string(),
                schedules: Some(BackupSchedules {
                    full: Some(FULL_BACKUP_SCHEDULE.to_string()),
                }),
            }],
        },
    });

    let pmm = spec.monitoring_enabled.then(|| PmmSpec {
        enabled: true,
        image: defaults.image(&defaults.pmm_image),
        server_host: defaults.pmm_host.clone(),
    });

    PerconaPGCluster::new(
        metadata,
        PerconaPGClusterSpec {
            cr_version: defaults.cr_version.clone(),
            image: postgres_image(spec.version, defaults),
            postgres_version: spec.version,
            instances: vec![instance],
            proxy,
            backups,
            pmm,
        },
    )
}

/// PostgreSQL image reference: `<registry>/<image>:<major>.<pinned suffix>`
pub fn postgres_image(version: u32, defaults: &PlatformDefaults) -> String {
    format!(
        "{}/{}:{}.{}",
        defaults.image_registry, POSTGRES_IMAGE_NAME, version, defaults.image_tag_minor
    )
}

/// Soft anti-affinity spreading pods matching `selector` across hosts
fn preferred_host_anti_affinity(selector: (&str, &str)) -> Affinity {
    Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![
                WeightedPodAffinityTerm {
                    weight: 1,
                    pod_affinity_term: PodAffinityTerm {
                        label_selector: Some(LabelSelector {
                            match_labels: Some(BTreeMap::from([(
                                selector.0.to_string(),
                                selector.1.to_string(),
                            )])),
                            ..Default::default()
                        }),
                        topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
                        ..Default::default()
                    },
                },
            ]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn quantities(list: Option<&ResourceList>) -> Option<BTreeMap<String, Quantity>> {
    let list = list.filter(|l| !l.is_empty())?;
    let mut map = BTreeMap::new();
    if !list.cpu.is_empty() {
        map.insert("cpu".to_string(), Quantity(list.cpu.clone()));
    }
    if !list.memory.is_empty() {
        map.insert("memory".to_string(), Quantity(list.memory.clone()));
    }
    (!map.is_empty()).then_some(map)
}

fn build_resources(resources: &ResourceRequirements) -> Option<K8sResourceRequirements> {
    let requests = quantities(resources.requests.as_ref());
    let limits = quantities(resources.limits.as_ref());
    if requests.is_none() && limits.is_none() {
        return None;
    }
    Some(K8sResourceRequirements {
        requests,
        limits,
        ..Default::default()
    })
}

// =============================================================================
// Observation
// =============================================================================

/// The slice of a live PerconaPGCluster the controller looks at
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterObservation {
    /// Raw value of the state annotation, if any
    pub state: Option<String>,
    /// `spec.postgresVersion` recorded on the cluster, if any
    pub postgres_version: Option<u64>,
}

impl ClusterObservation {
    /// Extract the observation from a fetched cluster object
    pub fn from_object(obj: &DynamicObject) -> Self {
        Self {
            state: obj.annotations().get(STATE_ANNOTATION).cloned(),
            postgres_version: obj
                .data
                .pointer("/spec/postgresVersion")
                .and_then(|v| v.as_u64()),
        }
    }

    /// Whether the readiness signal is set
    pub fn is_ready(&self) -> bool {
        self.state.as_deref() == Some(STATE_READY)
    }
}
