//! Reconciliation and deployment metrics.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Registra las metricas de sincronizacion.
/// Llamar una vez al inicio.
pub fn register_sync_metrics() {
    metrics::describe_counter!(
        "vigil_reconciliations_total",
        "Reconciliation passes by result"
    );
    metrics::describe_histogram!(
        "vigil_reconciliation_duration_seconds",
        "Duration of one reconciliation pass"
    );
    metrics::describe_counter!("vigil_deployments_total", "Target deployments by result");
    metrics::describe_histogram!(
        "vigil_deployment_duration_seconds",
        "Duration of one target deployment"
    );
    metrics::describe_gauge!(
        "vigil_reconciliations_in_flight",
        "Reconciliation passes currently running"
    );
}

/// Recorder de metricas de reconciliacion.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncMetrics;

impl SyncMetrics {
    /// Registra el fin de una pasada
    pub fn record_reconciliation(&self, repo: &str, result: &'static str, duration: Duration) {
        counter!(
            "vigil_reconciliations_total",
            "repo" => repo.to_string(),
            "result" => result
        )
        .increment(1);
        histogram!("vigil_reconciliation_duration_seconds", "repo" => repo.to_string())
            .record(duration.as_secs_f64());
    }

    /// Registra un despliegue
    pub fn record_deployment(&self, repo: &str, result: &'static str, duration: Duration) {
        counter!(
            "vigil_deployments_total",
            "repo" => repo.to_string(),
            "result" => result
        )
        .increment(1);
        histogram!("vigil_deployment_duration_seconds", "repo" => repo.to_string())
            .record(duration.as_secs_f64());
    }

    /// Marca el inicio de una pasada
    pub fn pass_started(&self) {
        gauge!("vigil_reconciliations_in_flight").increment(1.0);
    }

    /// Marca el fin de una pasada
    pub fn pass_finished(&self) {
        gauge!("vigil_reconciliations_in_flight").decrement(1.0);
    }
}
