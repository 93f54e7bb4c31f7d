use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::actor::{SessionDurableActor, SessionHandle};
use crate::domain::config::AssessmentConfig;
use crate::domain::SessionId;
use crate::engine::ConversationalAssessmentEngine;
use crate::store::SessionStore;

/// Shared state for every axum handler: the pure engine, the store, and a
/// registry of the actor handles currently serving a live session.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConversationalAssessmentEngine>,
    pub store: Arc<dyn SessionStore>,
    actors: Arc<Mutex<HashMap<SessionId, SessionHandle>>>,
}

impl AppState {
    #[must_use]
    pub fn new(engine: Arc<ConversationalAssessmentEngine>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            engine,
            store,
            actors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn register_actor(&self, session_id: SessionId, config: AssessmentConfig) -> SessionHandle {
        let handle = SessionDurableActor::spawn(session_id, config, self.engine.clone(), self.store.clone());
        self.actors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(session_id, handle.clone());
        handle
    }

    pub fn actor_for(&self, session_id: SessionId) -> Option<SessionHandle> {
        self.actors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&session_id)
            .cloned()
    }
}
