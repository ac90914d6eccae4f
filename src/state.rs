use std::sync::Arc;

use crate::{
    config::Config,
    notify::BadgeNotifier,
    services::{BadgeService, ProgressService},
    store::{BadgeStore, ProgressStore, QuestionCatalog},
};
use axum::extract::FromRef;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub progress: Arc<ProgressService>,
    pub badges: Arc<BadgeService>,
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for Arc<ProgressService> {
    fn from_ref(state: &AppState) -> Self {
        state.progress.clone()
    }
}

impl FromRef<AppState> for Arc<BadgeService> {
    fn from_ref(state: &AppState) -> Self {
        state.badges.clone()
    }
}

impl AppState {
    /// Wires the services over a single store that serves every storage seam.
    pub fn with_store<S>(config: Config, store: Arc<S>, notifier: Arc<dyn BadgeNotifier>) -> Self
    where
        S: ProgressStore + QuestionCatalog + BadgeStore + 'static,
    {
        let progress = ProgressService::new(
            store.clone(),
            store.clone(),
            config.pass_threshold_mode,
        );
        let badges = BadgeService::new(store, notifier);

        Self {
            config,
            progress: Arc::new(progress),
            badges: Arc::new(badges),
        }
    }
}
