//! # Initialization
//!
//! Operator startup: rustls setup, tracing, metrics, the probe server, the Kubernetes
//! client and the shared reconciler context.

use crate::cluster::KubeCluster;
use crate::config::{load_config, ServerConfig};
use crate::constants::SINGLETON_NAME;
use crate::controller::reconciler::{run_pass, Context, ScaffoldingReconciler};
use crate::controller::server::{start_server, ServerState};
use crate::observability;
use anyhow::{Context as _, Result};
use kube::Client;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

/// Initialization result containing all necessary components for the operator
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Shared context every reconciler pass runs with
    pub context: Arc<Context<KubeCluster>>,
    /// HTTP and webhook server settings
    pub server_config: ServerConfig,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

/// Initialize the operator runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Recreating the scaffolding singleton if it is missing
pub async fn initialize() -> Result<InitializationResult> {
    // Required for rustls 0.23+ when no default provider is selected via features
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spire_identity_operator=info".into()),
        )
        .init();

    info!("Starting SPIRE Identity Operator v{}", env!("CARGO_PKG_VERSION"));

    let (operator_config, server_config) = load_config();
    info!(
        operand_namespace = %operator_config.operand_namespace,
        create_only = operator_config.create_only,
        resync_interval_secs = operator_config.resync_interval_secs,
        "Loaded operator configuration"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let metrics_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(metrics_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_config, &server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let context = Arc::new(Context::new(
        KubeCluster::new(client.clone()),
        Arc::new(operator_config),
    ));

    ensure_singleton(&context).await;

    info!("Operator initialized, starting watch loops...");
    Ok(InitializationResult {
        client,
        context,
        server_config,
        server_state,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    config: &ServerConfig,
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = std::time::Duration::from_secs(config.startup_timeout_secs);
    let poll_interval = std::time::Duration::from_millis(config.poll_interval_ms);
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Run one scaffolding pass before the watches start, recreating the singleton if needed
async fn ensure_singleton(context: &Context<KubeCluster>) {
    let span = tracing::span!(
        tracing::Level::INFO,
        "controller.startup.ensure_singleton",
        resource.name = SINGLETON_NAME
    );

    if let Err(e) = run_pass(&ScaffoldingReconciler, context, SINGLETON_NAME)
        .instrument(span)
        .await
    {
        // Not fatal: the scaffolding controller retries once it is running
        warn!(error = %e, "Startup scaffolding pass failed");
    }
}
