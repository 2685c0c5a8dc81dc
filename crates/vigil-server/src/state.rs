//! Application state.

use std::sync::Arc;

use vigil_core::{SecretProvider, Settings, StateStore};

use crate::sync::SchedulerHandle;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    store: StateStore,
    scheduler: SchedulerHandle,
    secrets: Arc<dyn SecretProvider>,
}

impl AppState {
    /// Creates the state from the running agent's parts.
    pub fn new(
        settings: Arc<Settings>,
        store: StateStore,
        scheduler: SchedulerHandle,
        secrets: Arc<dyn SecretProvider>,
    ) -> Self {
        Self {
            settings,
            store,
            scheduler,
            secrets,
        }
    }

    /// Loaded settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The status store.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// The lane scheduler.
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// The webhook secret, if configured.
    pub fn webhook_secret(&self) -> Option<String> {
        self.secrets
            .get_secret(&self.settings.secrets.webhook_secret_key)
            .filter(|s| !s.is_empty())
    }
}
