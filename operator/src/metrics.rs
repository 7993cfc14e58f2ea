//! Prometheus metrics for the rollout operator

use std::net::SocketAddr;

use consensus_rollout::RolloutProgress;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::info;

lazy_static::lazy_static! {
    /// Registry served by the metrics endpoint
    pub static ref REGISTRY: Registry = Registry::new();
}

/// Collectors updated by the controller
#[derive(Clone)]
pub struct Metrics {
    /// Reconciliations by result
    reconciliations: IntCounterVec,
    /// Reconciliation duration
    duration: HistogramVec,
    /// Pods deleted to advance a rollout
    deletions: IntCounterVec,
    /// Consensus status writes
    status_writes: IntCounterVec,
    /// Batches not yet settled
    batches_remaining: IntGaugeVec,
}

impl Metrics {
    /// Create the collectors and register them with `registry`.
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let metrics = Self {
            reconciliations: IntCounterVec::new(
                Opts::new(
                    "consensus_rollout_reconciliations_total",
                    "Total number of reconciliations",
                ),
                &["component", "result"],
            )?,
            duration: HistogramVec::new(
                HistogramOpts::new(
                    "consensus_rollout_reconciliation_duration_seconds",
                    "Duration of reconciliations",
                ),
                &["component"],
            )?,
            deletions: IntCounterVec::new(
                Opts::new(
                    "consensus_rollout_replica_deletions_total",
                    "Pods deleted to advance a rolling update",
                ),
                &["component"],
            )?,
            status_writes: IntCounterVec::new(
                Opts::new(
                    "consensus_rollout_status_writes_total",
                    "Consensus status changes written",
                ),
                &["component"],
            )?,
            batches_remaining: IntGaugeVec::new(
                Opts::new(
                    "consensus_rollout_batches_remaining",
                    "Update batches not yet settled",
                ),
                &["component"],
            )?,
        };

        registry.register(Box::new(metrics.reconciliations.clone()))?;
        registry.register(Box::new(metrics.duration.clone()))?;
        registry.register(Box::new(metrics.deletions.clone()))?;
        registry.register(Box::new(metrics.status_writes.clone()))?;
        registry.register(Box::new(metrics.batches_remaining.clone()))?;
        Ok(metrics)
    }

    /// Record a successful pass
    pub fn record_pass(
        &self,
        component: &str,
        status_changed: bool,
        progress: &RolloutProgress,
        duration_secs: f64,
    ) {
        self.reconciliations
            .with_label_values(&[component, "success"])
            .inc();
        self.duration
            .with_label_values(&[component])
            .observe(duration_secs);
        if status_changed {
            self.status_writes.with_label_values(&[component]).inc();
        }

        let remaining = match progress {
            RolloutProgress::InProgress {
                current_batch,
                total_batches,
                deleted,
            } => {
                self.deletions
                    .with_label_values(&[component])
                    .inc_by(deleted.len() as u64);
                total_batches.saturating_sub(*current_batch)
            }
            RolloutProgress::NotReady(_) | RolloutProgress::Complete => 0,
        };
        self.batches_remaining
            .with_label_values(&[component])
            .set(remaining as i64);
    }

    /// Record a failed pass
    pub fn record_failure(&self, component: &str, kind: &str) {
        self.reconciliations
            .with_label_values(&[component, kind])
            .inc();
    }
}

/// Text exposition of every registered metric
pub fn render() -> String {
    TextEncoder::new()
        .encode_to_string(&REGISTRY.gather())
        .unwrap_or_default()
}

/// Run the metrics server
pub async fn run_metrics_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = %port, "Metrics server started");

    loop {
        if let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;

                let metrics = render();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
                    metrics.len(),
                    metrics
                );
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    }
}

/// Run the health server
pub async fn run_health_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = %port, "Health server started");

    loop {
        if let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;

                let response = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nOK";
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_pass() {
        let registry = Registry::new();
        let metrics = Metrics::new(&registry).unwrap();

        metrics.record_pass(
            "default/db",
            true,
            &RolloutProgress::InProgress {
                current_batch: 1,
                total_batches: 4,
                deleted: vec!["mysql-1".to_string(), "mysql-2".to_string()],
            },
            0.02,
        );

        assert_eq!(
            metrics
                .deletions
                .with_label_values(&["default/db"])
                .get(),
            2
        );
        assert_eq!(
            metrics
                .batches_remaining
                .with_label_values(&["default/db"])
                .get(),
            3
        );
        assert_eq!(
            metrics
                .status_writes
                .with_label_values(&["default/db"])
                .get(),
            1
        );

        metrics.record_pass("default/db", false, &RolloutProgress::Complete, 0.01);
        assert_eq!(
            metrics
                .batches_remaining
                .with_label_values(&["default/db"])
                .get(),
            0
        );
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        Metrics::new(&registry).unwrap();
        assert!(Metrics::new(&registry).is_err());
    }
}
