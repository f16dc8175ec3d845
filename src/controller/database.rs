//! PostgresDatabase controller implementation
//!
//! Each reconcile re-reads the PostgresDatabase, validates it, makes sure the
//! PerconaPGCluster of the same name exists, and projects the cluster's
//! readiness back into the PostgresDatabase status. The child is created once
//! and never updated afterwards.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Api, DynamicObject, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Client, Resource, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::config::PlatformDefaults;
use crate::crd::{PostgresDatabase, PostgresDatabaseStatus};
use crate::manifest::{
    generate, to_dynamic_object, ClusterObservation, HasApiResource, ObjectKey, PerconaPGCluster,
};
use crate::status::{self, ChildState};
use crate::{Error, FIELD_MANAGER, REQUEUE_INTERVAL};

/// Requeue delay after a reconcile interrupted by shutdown
const CANCELLED_REQUEUE: Duration = Duration::from_secs(5);

/// Requeue delay after a failed reconcile
const ERROR_REQUEUE: Duration = Duration::from_secs(15);

/// Outcome of a create request for the child cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The cluster was created by this request
    Created,
    /// A cluster with the same identity was already there
    AlreadyExists,
}

/// Trait abstracting the Kubernetes operations the controller depends on
///
/// The real implementation talks to the API server; tests substitute a mock.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Fetch a PostgresDatabase, `None` if it no longer exists
    async fn get_database(&self, key: &ObjectKey) -> Result<Option<PostgresDatabase>, Error>;

    /// Fetch the PerconaPGCluster with the given identity, `None` if absent
    async fn get_cluster(&self, key: &ObjectKey) -> Result<Option<ClusterObservation>, Error>;

    /// Create a PerconaPGCluster owned by `owner`
    ///
    /// An existing cluster with the same identity is reported as
    /// [`CreateOutcome::AlreadyExists`] rather than as an error.
    async fn create_cluster(
        &self,
        cluster: &PerconaPGCluster,
        owner: &OwnerReference,
    ) -> Result<CreateOutcome, Error>;

    /// Merge-patch the status subresource of a PostgresDatabase
    async fn patch_status(
        &self,
        key: &ObjectKey,
        status: &PostgresDatabaseStatus,
    ) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn cluster_api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(
            self.client.clone(),
            namespace,
            &PerconaPGCluster::api_resource(),
        )
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_database(&self, key: &ObjectKey) -> Result<Option<PostgresDatabase>, Error> {
        let api: Api<PostgresDatabase> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn get_cluster(&self, key: &ObjectKey) -> Result<Option<ClusterObservation>, Error> {
        let obj = self.cluster_api(&key.namespace).get_opt(&key.name).await?;
        Ok(obj.as_ref().map(ClusterObservation::from_object))
    }

    async fn create_cluster(
        &self,
        cluster: &PerconaPGCluster,
        owner: &OwnerReference,
    ) -> Result<CreateOutcome, Error> {
        let mut cluster = cluster.clone();
        cluster.metadata.owner_references = vec![owner.clone()];
        let obj = to_dynamic_object(&cluster)?;

        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };

        match self
            .cluster_api(&cluster.metadata.namespace)
            .create(&params, &obj)
            .await
        {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(e) if is_already_exists(&e) => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_status(
        &self,
        key: &ObjectKey,
        status: &PostgresDatabaseStatus,
    ) -> Result<(), Error> {
        let api: Api<PostgresDatabase> = Api::namespaced(self.client.clone(), &key.namespace);

        let status_patch = status::merge_patch(status)?;

        api.patch_status(
            &key.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&status_patch),
        )
        .await
        .map_err(|e| Error::status_write(e.to_string()))?;

        Ok(())
    }
}

/// Whether a create was rejected because the object already exists
///
/// Other 409s (e.g. a conflicting write) are real failures.
fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists")
}

/// Controller context shared by every reconcile
///
/// Holds the only state shared across keys: the client, the read-only
/// platform defaults and the shutdown token.
pub struct Context {
    /// Kubernetes client for API operations (trait object for testability)
    pub kube: Arc<dyn KubeClient>,
    /// Platform defaults for manifest generation
    pub defaults: Arc<PlatformDefaults>,
    /// Cancelled when the controller is shutting down
    pub cancel: CancellationToken,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }

    /// Create a context for testing with a mock client
    #[cfg(test)]
    pub fn for_testing(kube: Arc<dyn KubeClient>) -> Self {
        Self {
            kube,
            defaults: Arc::new(PlatformDefaults::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Run a remote call, giving up as soon as shutdown is signalled
    async fn guarded<T>(&self, call: impl Future<Output = Result<T, Error>>) -> Result<T, Error> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = call => result,
        }
    }
}

/// Builder for constructing [`Context`] instances
///
/// ```ignore
/// let ctx = Context::builder(client)
///     .defaults(PlatformDefaults::default())
///     .cancellation(token.clone())
///     .build();
/// ```
pub struct ContextBuilder {
    client: Client,
    kube: Option<Arc<dyn KubeClient>>,
    defaults: PlatformDefaults,
    cancel: CancellationToken,
}

impl ContextBuilder {
    fn new(client: Client) -> Self {
        Self {
            client,
            kube: None,
            defaults: PlatformDefaults::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Set the platform defaults
    pub fn defaults(mut self, defaults: PlatformDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Set the shutdown token
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Override the Kubernetes client (primarily for testing)
    pub fn kube_client(mut self, kube: Arc<dyn KubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        Context {
            kube: self
                .kube
                .unwrap_or_else(|| Arc::new(KubeClientImpl::new(self.client.clone()))),
            defaults: Arc::new(self.defaults),
            cancel: self.cancel,
        }
    }
}

/// Reconcile a PostgresDatabase resource
///
/// The watcher's copy is only used for its identity; the object is re-read so
/// that a concurrent delete is noticed before anything is created.
///
/// Returns `await_change` when the object is gone or its spec is invalid, and
/// a fixed 30s requeue otherwise.
#[instrument(
    skip(database, ctx),
    fields(database = %database.name_any(), namespace = ?database.namespace())
)]
pub async fn reconcile(database: Arc<PostgresDatabase>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = database.name_any();
    let namespace = database
        .namespace()
        .ok_or_else(|| Error::missing_identity(format!("PostgresDatabase {} has no namespace", name)))?;
    let key = ObjectKey::new(name, namespace);

    let Some(database) = ctx.guarded(ctx.kube.get_database(&key)).await? else {
        info!("PostgresDatabase no longer exists, nothing to do");
        return Ok(Action::await_change());
    };
    let generation = database.metadata.generation;

    let spec = database.spec.with_defaults();
    if let Err(e) = spec.validate() {
        let reason = match &e {
            Error::Validation { field, reason } => format!("{}: {}", field, reason),
            other => other.to_string(),
        };
        warn!(error = %reason, "PostgresDatabase spec rejected");
        let next = status::validation_failed(&reason, generation);
        write_status(&ctx, &key, database.status.as_ref(), &next).await?;
        return Err(e);
    }

    let next = match ctx.guarded(ctx.kube.get_cluster(&key)).await? {
        Some(observation) => {
            debug!(state = ?observation.state, "PerconaPGCluster exists");
            status::project(ChildState::Observed(&observation), &spec, &key, generation)
        }
        None => {
            let mut owner = database.controller_owner_ref(&()).ok_or_else(|| {
                Error::missing_identity(format!("PostgresDatabase {} has no uid", key))
            })?;
            owner.block_owner_deletion = Some(true);
            let cluster = generate(&spec, &ctx.defaults, &key);

            match ctx.guarded(ctx.kube.create_cluster(&cluster, &owner)).await {
                Ok(CreateOutcome::Created) => {
                    info!(image = %cluster.spec.image, "created PerconaPGCluster");
                    status::project(ChildState::JustCreated, &spec, &key, generation)
                }
                Ok(CreateOutcome::AlreadyExists) => {
                    debug!("PerconaPGCluster already exists, reading its state");
                    match ctx.guarded(ctx.kube.get_cluster(&key)).await? {
                        Some(observation) => status::project(
                            ChildState::Observed(&observation),
                            &spec,
                            &key,
                            generation,
                        ),
                        None => status::project(ChildState::JustCreated, &spec, &key, generation),
                    }
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    error!(error = %e, "failed to create PerconaPGCluster");
                    let next = status::create_failed(&e.to_string(), generation);
                    write_status(&ctx, &key, database.status.as_ref(), &next).await?;
                    return Err(Error::child_create(e.to_string()));
                }
            }
        }
    };

    write_status(&ctx, &key, database.status.as_ref(), &next).await?;
    Ok(Action::requeue(REQUEUE_INTERVAL))
}

/// Best-effort status write.
///
/// Skips the write when nothing changed. Write failures are logged and
/// swallowed; only cancellation is propagated.
async fn write_status(
    ctx: &Context,
    key: &ObjectKey,
    current: Option<&PostgresDatabaseStatus>,
    next: &PostgresDatabaseStatus,
) -> Result<(), Error> {
    if !status::needs_update(current, next) {
        debug!(phase = %next.phase, "status unchanged, skipping update");
        return Ok(());
    }

    match ctx.guarded(ctx.kube.patch_status(key, next)).await {
        Ok(()) => {
            info!(phase = %next.phase, "updated status");
            Ok(())
        }
        Err(Error::Cancelled) => Err(Error::Cancelled),
        Err(e) => {
            warn!(error = %e, phase = %next.phase, "failed to update status");
            Ok(())
        }
    }
}

/// Error policy for the controller
///
/// Shutdown interruptions come back quickly, other failures after a longer
/// delay. Errors that need a spec change wait for the next event instead.
pub fn error_policy(database: Arc<PostgresDatabase>, error: &Error, _ctx: Arc<Context>) -> Action {
    if error.is_cancelled() {
        debug!(database = %database.name_any(), "reconcile cancelled");
        return Action::requeue(CANCELLED_REQUEUE);
    }

    if !error.is_retryable() {
        warn!(%error, database = %database.name_any(), "waiting for spec change");
        return Action::await_change();
    }

    error!(
        ?error,
        database = %database.name_any(),
        "reconciliation failed"
    );
    Action::requeue(ERROR_REQUEUE)
}
