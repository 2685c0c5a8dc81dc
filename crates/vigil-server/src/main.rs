//! VigilCD agent binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use vigil_core::{Settings, StateStore, SystemRunner, settings::config_path};
use vigil_deploy::DockerEndpoint;
use vigil_server::{AppState, RepoSyncEngine, Scheduler, create_router, logging, metrics, run_server, shutdown_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_file = config_path();
    let settings = Settings::load(&config_file)
        .with_context(|| format!("Failed to load configuration from {}", config_file.display()))?;

    logging::init_tracing(&settings.logging)?;

    info!("Starting VigilCD v{}", env!("CARGO_PKG_VERSION"));
    info!(
        config = %config_file.display(),
        repos = settings.repos.len(),
        interval_minutes = settings.scheduling.check_interval_minutes,
        "Configuration loaded"
    );

    let prometheus = metrics::init_metrics().context("Failed to initialize metrics")?;

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", settings.server.host, settings.server.port))?;

    let secrets = settings.secrets.backend.build(&settings.secrets.file);

    let store = StateStore::open(&settings.paths.status_file);
    store.retain_configured(&settings.repos);

    let settings = Arc::new(settings);
    let engine = RepoSyncEngine::new(
        settings.clone(),
        store.clone(),
        Arc::new(SystemRunner),
        secrets.clone(),
        DockerEndpoint::detect(),
    );

    let scheduler = Scheduler::from_settings(&settings).start(Arc::new(engine));

    let state = AppState::new(settings, store, scheduler.clone(), secrets);
    let router = create_router(state, prometheus);

    let served = run_server(addr, router, shutdown_signal()).await;

    info!("Waiting for in-flight reconciliations");
    scheduler.shutdown().await;

    served.context("HTTP server failed")
}
