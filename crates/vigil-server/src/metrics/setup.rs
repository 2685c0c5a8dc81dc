//! Metrics setup and initialization.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

use super::{http::register_http_metrics, sync::register_sync_metrics};

/// Inicializa el sistema de metricas y retorna el handle para el endpoint.
///
/// # Errors
///
/// Falla si ya hay un recorder global instalado.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    // Buckets en segundos
    let handle = PrometheusBuilder::new()
        .set_buckets(&[
            0.005, // 5 milisegundos
            0.025, // 25 milisegundos
            0.1,   // 100 milisegundos
            0.5,   // 500 milisegundos
            1.0,   // 1 segundo
            2.5,   // 2.5 segundos
            5.0,   // 5 segundos
            10.0,  // 10 segundos
            30.0,  // 30 segundos
            60.0,  // 1 minuto
            120.0, // 2 minutos
            300.0, // 5 minutos
            600.0, // 10 minutos
        ])?
        .install_recorder()?;

    register_http_metrics();
    register_sync_metrics();

    info!("Metrics system initialized");
    Ok(handle)
}
