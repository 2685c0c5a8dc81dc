//! Metricas Prometheus del agente.

pub mod http;
pub mod setup;
pub mod sync;

pub use setup::init_metrics;
pub use sync::SyncMetrics;
