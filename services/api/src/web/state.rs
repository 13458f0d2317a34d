//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use std::sync::Arc;

use healthbot_core::answer::TieredAnswerEngine;
use healthbot_core::conflict::MedicineConflictChecker;
use healthbot_core::ports::{DocumentTextExtractor, LanguageModel, RecordStore};
use healthbot_core::share::ShareSessionManager;

use crate::config::Config;

/// The shared application state, created once at startup and passed to all
/// handlers. The core components are constructed here with their dependencies
/// injected, so tests can wire in fakes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn RecordStore>,
    pub extractor: Arc<dyn DocumentTextExtractor>,
    pub model: Arc<dyn LanguageModel>,
    pub sessions: ShareSessionManager,
    pub answers: TieredAnswerEngine,
    pub conflicts: MedicineConflictChecker,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn RecordStore>,
        extractor: Arc<dyn DocumentTextExtractor>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            sessions: ShareSessionManager::new(store.clone()),
            answers: TieredAnswerEngine::new(store.clone(), model.clone()),
            conflicts: MedicineConflictChecker::new(store.clone(), model.clone()),
            config,
            store,
            extractor,
            model,
        }
    }
}
