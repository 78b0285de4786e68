// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    judge::JudgeClient,
    services::{AttemptService, Evaluator},
    store::Store,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub attempts: AttemptService,
    pub evaluator: Evaluator,
}

impl AppState {
    /// Wires the services around the given collaborators.
    pub fn new(config: Config, store: Arc<dyn Store>, judge: Arc<dyn JudgeClient>) -> Self {
        Self {
            attempts: AttemptService::new(store.clone()),
            evaluator: Evaluator::new(store, judge, config.poll, config.max_source_bytes),
            config,
        }
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for AttemptService {
    fn from_ref(state: &AppState) -> Self {
        state.attempts.clone()
    }
}

impl FromRef<AppState> for Evaluator {
    fn from_ref(state: &AppState) -> Self {
        state.evaluator.clone()
    }
}
