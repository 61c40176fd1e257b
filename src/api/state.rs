use std::sync::Arc;
use std::time::Duration;

use crate::{
    db::{Catalog, SessionStore},
    services::{CompletionProvider, RecommendationEngine, SessionRegistry, SystemClock},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub engine: Arc<RecommendationEngine>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionRegistry>, engine: Arc<RecommendationEngine>) -> Self {
        Self { sessions, engine }
    }

    /// Wires the registry and engine from their backends, using the system clock
    pub fn from_backends(
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn SessionStore>,
        completion: Arc<dyn CompletionProvider>,
        ai_timeout: Duration,
    ) -> Self {
        let sessions = Arc::new(SessionRegistry::new(store, Arc::new(SystemClock)));
        let engine = Arc::new(RecommendationEngine::new(catalog, completion, ai_timeout));
        Self::new(sessions, engine)
    }
}
