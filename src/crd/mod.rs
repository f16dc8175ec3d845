//! Custom Resource Definitions for the PostgresDatabase controller

mod database;
mod quantity;
mod types;

pub use database::{
    PostgresDatabase, PostgresDatabaseSpec, PostgresDatabaseStatus, DEFAULT_BACKUP_RETENTION,
    REPLICA_RANGE, SUPPORTED_POSTGRES_VERSIONS,
};
pub use quantity::{is_capacity_quantity, is_cpu_quantity};
pub use types::{
    DatabasePhase, ResourceList, ResourceRequirements, DEFAULT_LIMIT_CPU, DEFAULT_LIMIT_MEMORY,
    DEFAULT_REQUEST_CPU, DEFAULT_REQUEST_MEMORY,
};
