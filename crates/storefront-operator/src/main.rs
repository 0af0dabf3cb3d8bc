//! Storefront Operator
//!
//! Serves the store provisioning API and drives each store's Helm release
//! until it is ready.

use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use storefront_operator::prelude::*;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

/// Storefront Operator
#[derive(Parser, Debug)]
#[command(name = "storefront-operator")]
#[command(about = "Provisions isolated per-tenant store instances on Kubernetes")]
#[command(version)]
struct Args {
    /// API server address
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:4000")]
    listen_addr: SocketAddr,

    /// Metrics server address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9090")]
    metrics_addr: SocketAddr,

    /// YAML configuration file
    #[arg(long, env = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Maximum number of live stores
    #[arg(long, env = "MAX_STORES")]
    max_stores: Option<usize>,

    /// Seconds between readiness checks
    #[arg(long, env = "POLL_INTERVAL_SECS")]
    poll_interval_secs: Option<u64>,

    /// Missed readiness checks before a store fails
    #[arg(long, env = "POLL_RETRY_LIMIT")]
    poll_retry_limit: Option<u32>,

    /// Helm binary
    #[arg(long, env = "HELM_BIN")]
    helm_bin: Option<String>,

    /// Kube context passed to helm
    #[arg(long, env = "KUBE_CONTEXT")]
    kube_context: Option<String>,

    /// Domain appended to store hostnames
    #[arg(long, env = "BASE_DOMAIN")]
    base_domain: Option<String>,

    /// Administrative password for new stores
    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,

    /// Requests per minute per client IP on /stores (0 disables)
    #[arg(long, env = "RATE_LIMIT_PER_MINUTE", default_value = "100")]
    rate_limit_per_minute: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: Level,

    /// Enable JSON log format
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let config = load_config(&args)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        max_stores = config.max_stores,
        poll_interval_secs = config.poller.interval_secs,
        poll_retry_limit = config.poller.retry_limit,
        base_domain = %config.chart.base_domain,
        "Starting Storefront Operator"
    );

    // Initialize metrics
    let metrics_addr = args.metrics_addr;
    tokio::spawn(async move {
        if let Err(e) = start_metrics_server(metrics_addr).await {
            tracing::error!(error = %e, "Metrics server failed");
        }
    });

    // Create Kubernetes client
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let cluster = Arc::new(KubeClusterClient::new(client));
    let executor = Arc::new(HelmExecutor::new(config.helm.clone()));

    let controller = Arc::new(ProvisioningController::new(
        &config,
        cluster.clone(),
        cluster,
        executor,
    ));

    let server = StoreServer::new(
        controller.clone(),
        ServerConfig {
            rate_limit: RateLimitConfig {
                max_requests: args.rate_limit_per_minute,
                window: Duration::from_secs(60),
            },
        },
    );

    server
        .run_until(args.listen_addr, shutdown_signal())
        .await
        .context("API server failed")?;

    controller.shutdown();
    info!("Storefront Operator stopped");
    Ok(())
}

/// Build the effective configuration: file first, then flag/env overrides
fn load_config(args: &Args) -> Result<OperatorConfig> {
    let mut config = match &args.config {
        Some(path) => OperatorConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => OperatorConfig::default(),
    };

    if let Some(max_stores) = args.max_stores {
        config.max_stores = max_stores;
    }
    if let Some(interval) = args.poll_interval_secs {
        config.poller.interval_secs = interval;
    }
    if let Some(retry_limit) = args.poll_retry_limit {
        config.poller.retry_limit = retry_limit;
    }
    if let Some(binary) = &args.helm_bin {
        config.helm.binary = binary.clone();
    }
    if let Some(context) = &args.kube_context {
        config.helm.kube_context = Some(context.clone());
    }
    if let Some(domain) = &args.base_domain {
        config.chart.base_domain = domain.clone();
    }
    if let Some(password) = &args.admin_password {
        config.chart.admin_password = SensitiveString::new(password.clone());
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Initialize logging subsystem
fn init_logging(args: &Args) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(false);

    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Start the Prometheus metrics server
async fn start_metrics_server(addr: SocketAddr) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    info!(address = %addr, "Starting metrics server");

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    // Keep the server running
    std::future::pending::<()>().await;

    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
