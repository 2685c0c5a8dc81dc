//! Aplicacion de prueba con scheduler falso.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusBuilder;
use parking_lot::Mutex;
use vigil_core::secrets::StaticSecrets;
use vigil_core::{Settings, StateStore};
use vigil_server::{AppState, Reconciler, Scheduler, SchedulerHandle, create_router};

use super::client::TestClient;

pub const WEBHOOK_SECRET: &str = "webhook-s3cret";

/// Settings con un repositorio `demo` (main sincronizada, legacy deshabilitada).
pub fn settings() -> Settings {
    Settings::from_yaml(
        r#"
server:
  cors_origins: ["http://localhost:4200"]
repos:
  - name: demo
    url: https://github.com/org/demo.git
    registries:
      - url: docker.io
      - url: ghcr.io
        username: deploy-bot
        password_env_var: GHCR_PASSWORD
    branches:
      - name: main
        targets:
          - name: web
            file: docker-compose.yml
            deploy: true
      - name: legacy
        sync_enabled: false
"#,
    )
    .expect("valid test settings")
}

/// Reconciler que solo registra las llamadas.
#[derive(Default)]
pub struct CountingReconciler {
    pub calls: Mutex<Vec<(String, String)>>,
}

impl CountingReconciler {
    pub fn calls_for(&self, repo: &str, branch: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(r, b)| r == repo && b == branch)
            .count()
    }
}

#[async_trait]
impl Reconciler for CountingReconciler {
    async fn reconcile(&self, repo: &str, branch: &str) {
        self.calls.lock().push((repo.to_string(), branch.to_string()));
    }
}

/// Router completo sobre un store en memoria.
pub struct TestApp {
    pub store: StateStore,
    pub reconciler: Arc<CountingReconciler>,
    pub scheduler: SchedulerHandle,
    pub client: TestClient,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_secrets(StaticSecrets::from_iter([("GITHUB_WEBHOOK_SECRET", WEBHOOK_SECRET)]))
    }

    pub fn with_secrets(secrets: StaticSecrets) -> Self {
        let settings = Arc::new(settings());
        let store = StateStore::in_memory();
        let reconciler = Arc::new(CountingReconciler::default());

        // Intervalo largo: solo corre la pasada inicial de cada lane
        let scheduler = Scheduler::new(
            Duration::from_secs(3600),
            [("demo".to_string(), "main".to_string())],
        )
        .start(reconciler.clone());

        let state = AppState::new(settings, store.clone(), scheduler.clone(), Arc::new(secrets));
        let prometheus = PrometheusBuilder::new().build_recorder().handle();

        Self {
            store,
            reconciler,
            scheduler,
            client: TestClient::new(create_router(state, prometheus)),
        }
    }
}
