//! Platform-wide defaults used when generating PerconaPGCluster manifests
//!
//! Built once at startup from CLI flags (each backed by an environment
//! variable) and shared read-only with every reconcile.

use clap::Args;

/// Default container registry for all Percona images
pub const DEFAULT_IMAGE_REGISTRY: &str = "docker.io/percona";

/// Minor/patch suffix appended to the major version in the PostgreSQL image tag.
///
/// Pinned. The tag is never resolved from a registry lookup.
pub const DEFAULT_IMAGE_TAG_MINOR: &str = "7-2";

/// Default StorageClass for data volume claims
pub const DEFAULT_STORAGE_CLASS: &str = "standard";

/// Default `crVersion` of the Percona operator the manifests target
pub const DEFAULT_CR_VERSION: &str = "2.8.2";

/// Default PgBouncer image (relative to the registry)
pub const DEFAULT_PGBOUNCER_IMAGE: &str = "percona-pgbouncer:1.25.0-1";

/// Default pgBackRest image (relative to the registry)
pub const DEFAULT_PGBACKREST_IMAGE: &str = "percona-pgbackrest:2.57.0-1";

/// Default PMM client image (relative to the registry)
pub const DEFAULT_PMM_IMAGE: &str = "pmm-client:3.5.0";

/// Default PMM server host
pub const DEFAULT_PMM_HOST: &str = "prometheus.monitoring";

/// Immutable platform defaults consumed by the manifest generator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformDefaults {
    /// Registry prefix for every image reference
    pub image_registry: String,
    /// Suffix after `<major>.` in the PostgreSQL image tag
    pub image_tag_minor: String,
    /// StorageClass for data volumes
    pub storage_class: String,
    /// Percona operator CR version
    pub cr_version: String,
    /// PgBouncer image name and tag
    pub pgbouncer_image: String,
    /// pgBackRest image name and tag
    pub pgbackrest_image: String,
    /// PMM client image name and tag
    pub pmm_image: String,
    /// PMM server host
    pub pmm_host: String,
}

impl Default for PlatformDefaults {
    fn default() -> Self {
        Self {
            image_registry: DEFAULT_IMAGE_REGISTRY.to_string(),
            image_tag_minor: DEFAULT_IMAGE_TAG_MINOR.to_string(),
            storage_class: DEFAULT_STORAGE_CLASS.to_string(),
            cr_version: DEFAULT_CR_VERSION.to_string(),
            pgbouncer_image: DEFAULT_PGBOUNCER_IMAGE.to_string(),
            pgbackrest_image: DEFAULT_PGBACKREST_IMAGE.to_string(),
            pmm_image: DEFAULT_PMM_IMAGE.to_string(),
            pmm_host: DEFAULT_PMM_HOST.to_string(),
        }
    }
}

impl PlatformDefaults {
    /// Qualify an image name with the configured registry
    pub fn image(&self, name: &str) -> String {
        format!("{}/{}", self.image_registry, name)
    }
}

/// CLI flags for platform defaults
#[derive(Args, Clone, Debug)]
pub struct PlatformArgs {
    /// Registry prefix for all database images
    #[arg(long, env = "PGDB_IMAGE_REGISTRY", default_value = DEFAULT_IMAGE_REGISTRY)]
    pub image_registry: String,

    /// Pinned minor/patch suffix of the PostgreSQL image tag
    #[arg(long, env = "PGDB_IMAGE_TAG_MINOR", default_value = DEFAULT_IMAGE_TAG_MINOR)]
    pub image_tag_minor: String,

    /// StorageClass for database volumes
    #[arg(long, env = "PGDB_STORAGE_CLASS", default_value = DEFAULT_STORAGE_CLASS)]
    pub storage_class: String,

    /// Percona operator CR version written into manifests
    #[arg(long, env = "PGDB_CR_VERSION", default_value = DEFAULT_CR_VERSION)]
    pub cr_version: String,

    /// PgBouncer image (relative to the registry)
    #[arg(long, env = "PGDB_PGBOUNCER_IMAGE", default_value = DEFAULT_PGBOUNCER_IMAGE)]
    pub pgbouncer_image: String,

    /// pgBackRest image (relative to the registry)
    #[arg(long, env = "PGDB_PGBACKREST_IMAGE", default_value = DEFAULT_PGBACKREST_IMAGE)]
    pub pgbackrest_image: String,

    /// PMM client image (relative to the registry)
    #[arg(long, env = "PGDB_PMM_IMAGE", default_value = DEFAULT_PMM_IMAGE)]
    pub pmm_image: String,

    /// PMM server host
    #[arg(long, env = "PGDB_PMM_HOST", default_value = DEFAULT_PMM_HOST)]
    pub pmm_host: String,
}

impl From<PlatformArgs> for PlatformDefaults {
    fn from(args: PlatformArgs) -> Self {
        Self {
            image_registry: args.image_registry,
            image_tag_minor: args.image_tag_minor,
            storage_class: args.storage_class,
            cr_version: args.cr_version,
            pgbouncer_image: args.pgbouncer_image,
            pgbackrest_image: args.pgbackrest_image,
            pmm_image: args.pmm_image,
            pmm_host: args.pmm_host,
        }
    }
}
