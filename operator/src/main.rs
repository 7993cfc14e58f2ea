//! Consensus Rollout Kubernetes Operator
//!
//! Drives role-aware rolling updates of StatefulSets running replicated
//! databases.

use std::path::PathBuf;

use clap::Parser;
use consensus_rollout::config::RolloutConfig;
use kube::CustomResourceExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod controller;
mod crd;
mod error;
mod metrics;
mod observe;
mod role_label;
mod store;

use controller::Controller;
use crd::ConsensusComponent;
use metrics::Metrics;

#[derive(Parser, Debug)]
#[command(name = "consensus-rollout-operator")]
#[command(about = "Kubernetes Operator for consensus-aware rolling updates")]
struct Args {
    /// Namespace to watch (empty for all namespaces)
    #[arg(short, long, default_value = "")]
    namespace: String,

    /// Metrics server port
    #[arg(short, long, default_value = "8080")]
    metrics_port: u16,

    /// Health check port
    #[arg(short = 'H', long, default_value = "8081")]
    health_port: u16,

    /// Log level, overridden by RUST_LOG
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Components reconciled concurrently
    #[arg(long)]
    max_concurrent_reconciles: Option<usize>,

    /// Print the CustomResourceDefinition as YAML and exit
    #[arg(long)]
    print_crd: bool,
}

impl Args {
    /// File configuration with command line overrides applied.
    fn rollout_config(&self) -> anyhow::Result<RolloutConfig> {
        let mut config = match &self.config {
            Some(path) => RolloutConfig::from_file(path)?,
            None => RolloutConfig::default(),
        };
        if let Some(n) = self.max_concurrent_reconciles {
            config.max_concurrent_reconciles = n;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_crd {
        print!("{}", serde_yaml::to_string(&ConsensusComponent::crd())?);
        return Ok(());
    }

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&args.log_level))?;
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = args.rollout_config()?;

    info!("Starting consensus rollout operator");
    info!(
        namespace = %args.namespace,
        max_concurrent_reconciles = config.max_concurrent_reconciles,
        "Watching namespace"
    );

    let rollout_metrics = Metrics::new(&metrics::REGISTRY)?;

    // Start metrics server
    let metrics_handle = tokio::spawn(metrics::run_metrics_server(args.metrics_port));

    // Start health server
    let health_handle = tokio::spawn(metrics::run_health_server(args.health_port));

    let controller = Controller::new(args.namespace.clone(), config, rollout_metrics).await?;
    let controller_handle = tokio::spawn(async move {
        if let Err(e) = controller.run().await {
            error!(error = %e, "Controller error");
        }
    });

    info!("Controller started");

    // Wait for any task to complete (usually due to shutdown signal)
    tokio::select! {
        _ = controller_handle => info!("Controller stopped"),
        result = metrics_handle => log_server_exit("Metrics", result),
        result = health_handle => log_server_exit("Health", result),
    }

    Ok(())
}

fn log_server_exit(
    server: &str,
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) {
    match result {
        Ok(Ok(())) => info!(server, "Server stopped"),
        Ok(Err(e)) => error!(server, error = %e, "Server failed"),
        Err(e) => error!(server, error = %e, "Server task panicked"),
    }
}
