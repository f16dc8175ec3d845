//! PostgresDatabase controller - managed PostgreSQL on the Percona operator

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use kube::api::{DynamicObject, Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pgdb::config::{PlatformArgs, PlatformDefaults};
use pgdb::controller::{error_policy, reconcile, Context};
use pgdb::crd::PostgresDatabase;
use pgdb::manifest::{generate, render_yaml, HasApiResource, ObjectKey, PerconaPGCluster};
use pgdb::FIELD_MANAGER;

/// Server-side watch timeout, kept below the client's read timeout
const WATCH_TIMEOUT_SECS: u32 = 25;

/// PostgresDatabase controller
#[derive(Parser, Debug)]
#[command(name = "pgdb-controller", version, about, long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, env = "PGDB_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(flatten)]
    platform: PlatformArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller (default mode)
    Controller(ControllerArgs),

    /// Print the PostgresDatabase CRD as YAML
    Crd,

    /// Print the PerconaPGCluster a PostgresDatabase would produce
    Render {
        /// Path to a PostgresDatabase YAML file
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
}

#[derive(clap::Args, Debug, Default)]
struct ControllerArgs {
    /// Only watch PostgresDatabases in this namespace
    #[arg(long, env = "PGDB_WATCH_NAMESPACE")]
    watch_namespace: Option<String>,

    /// Do not apply the PostgresDatabase CRD on startup
    #[arg(long, env = "PGDB_SKIP_CRD_INSTALL")]
    skip_crd_install: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let defaults = PlatformDefaults::from(cli.platform);

    match cli.command {
        Some(Commands::Crd) => {
            let crd = serde_yaml::to_string(&PostgresDatabase::crd())
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("{crd}");
            Ok(())
        }
        Some(Commands::Render { file }) => run_render(&file, &defaults),
        Some(Commands::Controller(args)) => run_controller(args, defaults).await,
        None => run_controller(ControllerArgs::default(), defaults).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

/// Render the manifest for a PostgresDatabase file without touching a cluster
fn run_render(path: &PathBuf, defaults: &PlatformDefaults) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let database: PostgresDatabase = serde_yaml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Invalid PostgresDatabase YAML: {}", e))?;

    let key = ObjectKey::new(
        database.name_any(),
        database.namespace().unwrap_or_else(|| "default".to_string()),
    );
    let spec = database.spec.with_defaults();
    spec.validate()?;

    let cluster = generate(&spec, defaults, &key);
    print!("{}", render_yaml(&cluster)?);
    Ok(())
}

/// Apply the PostgresDatabase CRD so its schema always matches this binary
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;

    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    tracing::info!("Installing PostgresDatabase CRD...");
    crds.patch(
        "postgresdatabases.databases.mycompany.com",
        &params,
        &Patch::Apply(&PostgresDatabase::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install PostgresDatabase CRD: {}", e))?;

    Ok(())
}

/// Cancel `token` on SIGINT or SIGTERM
async fn cancel_on_signal(token: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received, cancelling in-flight reconciles");
    token.cancel();
}

fn log_reconcile_result(
    result: Result<
        (ObjectRef<PostgresDatabase>, Action),
        kube::runtime::controller::Error<pgdb::Error, kube::runtime::watcher::Error>,
    >,
) {
    match result {
        Ok((obj, action)) => {
            tracing::debug!(database = %obj, ?action, "Reconciliation completed");
        }
        Err(e) => {
            tracing::error!(error = ?e, "Reconciliation error");
        }
    }
}

/// Run the controller until a shutdown signal arrives
async fn run_controller(args: ControllerArgs, defaults: PlatformDefaults) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if !args.skip_crd_install {
        ensure_crd_installed(&client).await?;
    }

    let token = CancellationToken::new();
    tokio::spawn(cancel_on_signal(token.clone()));

    let ctx = Arc::new(
        Context::builder(client.clone())
            .defaults(defaults)
            .cancellation(token)
            .build(),
    );

    let cluster_resource = PerconaPGCluster::api_resource();
    let (databases, clusters): (Api<PostgresDatabase>, Api<DynamicObject>) =
        match args.watch_namespace.as_deref() {
            Some(ns) => {
                tracing::info!(namespace = %ns, "Watching a single namespace");
                (
                    Api::namespaced(client.clone(), ns),
                    Api::namespaced_with(client.clone(), ns, &cluster_resource),
                )
            }
            None => (
                Api::all(client.clone()),
                Api::all_with(client.clone(), &cluster_resource),
            ),
        };

    let watcher_config = WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS);

    tracing::info!("Starting PostgresDatabase controller...");

    Controller::new(databases, watcher_config.clone())
        .owns_with(clusters, cluster_resource, watcher_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move { log_reconcile_result(result) })
        .await;

    tracing::info!("PostgresDatabase controller shutting down");
    Ok(())
}
