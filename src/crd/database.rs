//! PostgresDatabase Custom Resource Definition
//!
//! The PostgresDatabase CRD is the user-facing declaration of a managed
//! PostgreSQL database. The controller translates it into a single
//! PerconaPGCluster and reports the cluster's readiness back into status.

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::quantity::{check_capacity, check_cpu};
use super::types::{DatabasePhase, ResourceList, ResourceRequirements};
use crate::Error;

/// PostgreSQL major versions the platform can provision
pub const SUPPORTED_POSTGRES_VERSIONS: &[u32] = &[13, 14, 15, 16, 17];

/// Allowed replica counts (1 = single instance, 3+ = HA)
pub const REPLICA_RANGE: RangeInclusive<u32> = 1..=10;

/// Backup retention applied when none is given
pub const DEFAULT_BACKUP_RETENTION: &str = "7d";

fn default_true() -> bool {
    true
}

/// Specification for a PostgresDatabase
///
/// Written only by users. The controller reads it, never writes it back.
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "databases.mycompany.com",
    version = "v1",
    kind = "PostgresDatabase",
    plural = "postgresdatabases",
    shortname = "pgdb",
    namespaced,
    status = "PostgresDatabaseStatus",
    printcolumn = r#"{"name":"Version","type":"integer","jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Endpoint","type":"string","jsonPath":".status.endpoint"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PostgresDatabaseSpec {
    /// PostgreSQL major version (13, 14, 15, 16 or 17)
    #[schemars(range(min = 13, max = 17))]
    pub version: u32,

    /// Number of database replicas (1-10)
    #[schemars(range(min = 1, max = 10))]
    pub replicas: u32,

    /// Storage capacity per instance (e.g., "100Gi", "1Ti")
    #[schemars(regex(pattern = r"^[0-9]+(Ki|Mi|Gi|Ti|Pi|Ei)$"))]
    pub storage_size: String,

    /// Enable automated pgBackRest backups
    #[serde(default = "default_true")]
    pub backup_enabled: bool,

    /// Enable PMM monitoring
    #[serde(default = "default_true")]
    pub monitoring_enabled: bool,

    /// CPU and memory requests/limits for each instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_requirements: Option<ResourceRequirements>,

    /// Backup retention period (e.g., "7d", "30d")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    #[schemars(regex(pattern = r"^([0-9]+[dwmy])?$"))]
    pub backup_retention: String,
}

impl PostgresDatabaseSpec {
    /// Return a copy with every unset optional field filled in.
    ///
    /// Only absent values are touched; anything the user wrote is kept as-is.
    pub fn with_defaults(&self) -> Self {
        let mut spec = self.clone();
        if spec.backup_retention.is_empty() {
            spec.backup_retention = DEFAULT_BACKUP_RETENTION.to_string();
        }
        if spec.resource_requirements.is_none() {
            spec.resource_requirements = Some(ResourceRequirements::platform_default());
        }
        spec
    }

    /// Validate the specification, stopping at the first bad field.
    ///
    /// Fields are checked in a fixed order: version, replicas, storageSize,
    /// then requests cpu/memory and limits cpu/memory. Empty resource
    /// quantities count as unset and are skipped.
    pub fn validate(&self) -> Result<(), Error> {
        if !SUPPORTED_POSTGRES_VERSIONS.contains(&self.version) {
            return Err(Error::validation(
                "version",
                format!(
                    "unsupported PostgreSQL version {} (supported: {:?})",
                    self.version, SUPPORTED_POSTGRES_VERSIONS
                ),
            ));
        }

        if !REPLICA_RANGE.contains(&self.replicas) {
            return Err(Error::validation(
                "replicas",
                format!(
                    "replica count {} out of range ({}-{})",
                    self.replicas,
                    REPLICA_RANGE.start(),
                    REPLICA_RANGE.end()
                ),
            ));
        }

        check_capacity(&self.storage_size).map_err(|r| Error::validation("storageSize", r))?;

        if let Some(ref resources) = self.resource_requirements {
            if let Some(ref requests) = resources.requests {
                validate_resource_list(requests, "requests")?;
            }
            if let Some(ref limits) = resources.limits {
                validate_resource_list(limits, "limits")?;
            }
        }

        Ok(())
    }
}

fn validate_resource_list(list: &ResourceList, kind: &str) -> Result<(), Error> {
    if !list.cpu.is_empty() {
        check_cpu(&list.cpu)
            .map_err(|r| Error::validation(format!("resourceRequirements.{}.cpu", kind), r))?;
    }
    if !list.memory.is_empty() {
        check_capacity(&list.memory)
            .map_err(|r| Error::validation(format!("resourceRequirements.{}.memory", kind), r))?;
    }
    Ok(())
}

/// Status for a PostgresDatabase
///
/// Written only by the controller, through the status subresource.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostgresDatabaseStatus {
    /// Current phase
    #[serde(default)]
    pub phase: DatabasePhase,

    /// In-cluster connection endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Number of ready replicas
    #[serde(default)]
    pub ready_replicas: u32,

    /// Human-readable message or error detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Name of the Secret holding connection credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_secret_ref: Option<String>,

    /// Time of the last successful backup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backup_time: Option<DateTime<Utc>>,

    /// PostgreSQL version recorded on the running cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_running_version: Option<String>,

    /// State reported by the Percona operator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_cluster_state: Option<String>,

    /// Generation of the spec this status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl PostgresDatabaseStatus {
    /// Create a status with the given phase
    pub fn with_phase(phase: DatabasePhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    /// Set the message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set the observed generation
    pub fn observed_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_spec(yaml: &str) -> PostgresDatabaseSpec {
        serde_yaml::from_str(yaml).expect("parse spec")
    }

    fn sample_spec() -> PostgresDatabaseSpec {
        parse_spec(
            r#"
version: 16
replicas: 3
storageSize: 100Gi
"#,
        )
    }

    mod serde_defaults {
        use super::*;

        #[test]
        fn test_optional_flags_default_to_true() {
            let spec = sample_spec();
            assert!(spec.backup_enabled);
            assert!(spec.monitoring_enabled);
            assert!(spec.resource_requirements.is_none());
            assert!(spec.backup_retention.is_empty());
        }

        #[test]
        fn test_explicit_flags_are_kept() {
            let spec = parse_spec(
                r#"
version: 15
replicas: 1
storageSize: 10Gi
backupEnabled: false
monitoringEnabled: false
backupRetention: 30d
resourceRequirements:
  requests:
    cpu: 250m
    memory: 512Mi
"#,
            );
            assert!(!spec.backup_enabled);
            assert!(!spec.monitoring_enabled);
            assert_eq!(spec.backup_retention, "30d");
            let requests = spec.resource_requirements.unwrap().requests.unwrap();
            assert_eq!(requests.cpu, "250m");
            assert_eq!(requests.memory, "512Mi");
        }
    }

    mod defaulting {
        use super::*;

        #[test]
        fn test_fills_retention_and_resources() {
            let spec = sample_spec().with_defaults();
            assert_eq!(spec.backup_retention, DEFAULT_BACKUP_RETENTION);
            assert_eq!(
                spec.resource_requirements,
                Some(ResourceRequirements::platform_default())
            );
        }

        #[test]
        fn test_keeps_user_values() {
            let mut spec = sample_spec();
            spec.backup_retention = "14d".to_string();
            spec.resource_requirements = Some(ResourceRequirements {
                requests: None,
                limits: Some(ResourceList::new("2", "4Gi")),
            });

            let defaulted = spec.with_defaults();
            assert_eq!(defaulted.backup_retention, "14d");
            assert_eq!(defaulted.resource_requirements, spec.resource_requirements);
        }

        #[test]
        fn test_is_idempotent_and_leaves_input_untouched() {
            let spec = sample_spec();
            let once = spec.with_defaults();
            assert_eq!(once.with_defaults(), once);
            assert!(spec.resource_requirements.is_none());
        }
    }

    mod validation {
        use super::*;

        fn field_of(err: Error) -> String {
            match err {
                Error::Validation { field, .. } => field,
                other => panic!("Expected Validation error, got {other:?}"),
            }
        }

        #[test]
        fn test_valid_spec_passes() {
            assert!(sample_spec().validate().is_ok());
            assert!(sample_spec().with_defaults().validate().is_ok());
        }

        #[test]
        fn test_every_supported_version_passes() {
            for version in SUPPORTED_POSTGRES_VERSIONS {
                let mut spec = sample_spec();
                spec.version = *version;
                assert!(spec.validate().is_ok(), "version {version}");
            }
        }

        #[test]
        fn test_unsupported_version_rejected() {
            let mut spec = sample_spec();
            spec.version = 12;
            assert_eq!(field_of(spec.validate().unwrap_err()), "version");
        }

        #[test]
        fn test_replica_bounds() {
            let mut spec = sample_spec();
            spec.replicas = 0;
            assert_eq!(field_of(spec.validate().unwrap_err()), "replicas");
            spec.replicas = 11;
            assert_eq!(field_of(spec.validate().unwrap_err()), "replicas");
            spec.replicas = 10;
            assert!(spec.validate().is_ok());
        }

        #[test]
        fn test_bad_storage_rejected() {
            let mut spec = sample_spec();
            spec.storage_size = "100GB".to_string();
            let err = spec.validate().unwrap_err();
            assert!(err.to_string().contains("100GB"));
            assert_eq!(field_of(err), "storageSize");
        }

        #[test]
        fn test_bad_resource_fields_named() {
            let cases = [
                (ResourceList::new("fast", "1Gi"), None, "resourceRequirements.requests.cpu"),
                (ResourceList::new("1", "1G"), None, "resourceRequirements.requests.memory"),
                (
                    ResourceList::new("1", "1Gi"),
                    Some(ResourceList::new("0.5", "1Gi")),
                    "resourceRequirements.limits.cpu",
                ),
                (
                    ResourceList::new("1", "1Gi"),
                    Some(ResourceList::new("1", "lots")),
                    "resourceRequirements.limits.memory",
                ),
            ];

            for (requests, limits, expected) in cases {
                let mut spec = sample_spec();
                spec.resource_requirements = Some(ResourceRequirements {
                    requests: Some(requests),
                    limits,
                });
                assert_eq!(field_of(spec.validate().unwrap_err()), expected);
            }
        }

        #[test]
        fn test_empty_resource_quantities_skipped() {
            let mut spec = sample_spec();
            spec.resource_requirements = Some(ResourceRequirements {
                requests: Some(ResourceList::new("", "512Mi")),
                limits: Some(ResourceList::default()),
            });
            assert!(spec.validate().is_ok());
        }

        #[test]
        fn test_first_violation_wins() {
            let mut spec = sample_spec();
            spec.version = 9;
            spec.replicas = 0;
            spec.storage_size = "huge".to_string();
            assert_eq!(field_of(spec.validate().unwrap_err()), "version");

            spec.version = 16;
            assert_eq!(field_of(spec.validate().unwrap_err()), "replicas");

            spec.replicas = 3;
            spec.resource_requirements = Some(ResourceRequirements {
                requests: Some(ResourceList::new("x", "y")),
                limits: Some(ResourceList::new("x", "y")),
            });
            assert_eq!(field_of(spec.validate().unwrap_err()), "storageSize");
        }

        #[test]
        fn test_validation_does_not_mutate() {
            let mut spec = sample_spec();
            spec.storage_size = "bad".to_string();
            let before = spec.clone();
            let _ = spec.validate();
            assert_eq!(spec, before);
        }
    }

    mod definition {
        use super::*;
        use kube::CustomResourceExt;

        #[test]
        fn test_crd_identity() {
            let crd = PostgresDatabase::crd();
            assert_eq!(
                crd.metadata.name.as_deref(),
                Some("postgresdatabases.databases.mycompany.com")
            );
            assert_eq!(crd.spec.scope, "Namespaced");
            assert_eq!(
                crd.spec.names.short_names,
                Some(vec!["pgdb".to_string()])
            );

            let version = &crd.spec.versions[0];
            assert_eq!(version.name, "v1");
            assert!(version
                .subresources
                .as_ref()
                .and_then(|s| s.status.as_ref())
                .is_some());
            let schema = serde_json::to_value(&crd).unwrap();
            let spec = schema
                .pointer("/spec/versions/0/schema/openAPIV3Schema/properties/spec/properties")
                .unwrap();
            assert_eq!(spec["version"]["minimum"], 13.0);
            assert_eq!(spec["version"]["maximum"], 17.0);
            assert_eq!(spec["replicas"]["minimum"], 1.0);
            assert_eq!(spec["replicas"]["maximum"], 10.0);
            assert_eq!(
                spec["storageSize"]["pattern"],
                "^[0-9]+(Ki|Mi|Gi|Ti|Pi|Ei)$"
            );
            assert_eq!(spec["backupRetention"]["pattern"], "^([0-9]+[dwmy])?$");
            let rendered = schema.to_string();
            assert!(rendered.contains("^([0-9]+m?)?$"));
            assert!(rendered.contains("^([0-9]+(Ki|Mi|Gi|Ti|Pi|Ei))?$"));

            let columns: Vec<_> = version
                .additional_printer_columns
                .as_ref()
                .unwrap()
                .iter()
                .map(|c| c.name.as_str())
                .collect();
            assert_eq!(columns, ["Version", "Replicas", "Phase", "Endpoint", "Age"]);
        }
    }

    mod status {
        use super::*;

        #[test]
        fn test_builder() {
            let status = PostgresDatabaseStatus::with_phase(DatabasePhase::Failed)
                .message("boom")
                .observed_generation(Some(3));
            assert_eq!(status.phase, DatabasePhase::Failed);
            assert_eq!(status.message.as_deref(), Some("boom"));
            assert_eq!(status.observed_generation, Some(3));
        }

        #[test]
        fn test_wire_names() {
            let status = PostgresDatabaseStatus {
                phase: DatabasePhase::Ready,
                endpoint: Some("orders-rw.shop.svc.cluster.local".to_string()),
                ready_replicas: 3,
                credentials_secret_ref: Some("orders.postgres-secret".to_string()),
                upstream_cluster_state: Some("Ready".to_string()),
                observed_running_version: Some("16".to_string()),
                ..Default::default()
            };
            let json = serde_json::to_value(&status).unwrap();
            assert_eq!(json["phase"], "Ready");
            assert_eq!(json["readyReplicas"], 3);
            assert_eq!(json["credentialsSecretRef"], "orders.postgres-secret");
            assert_eq!(json["upstreamClusterState"], "Ready");
            assert_eq!(json["observedRunningVersion"], "16");
            assert!(json.get("lastBackupTime").is_none());
            assert!(json.get("message").is_none());
        }
    }
}
