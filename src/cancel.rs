//! Maps session id -> cancellation handle (spec.md §4.6, §5).
//!
//! Grounded directly in the teacher's `server::cancellation::CancellationManager`
//! (`tokio_util::sync::CancellationToken` keyed by id in a concurrent map),
//! generalized here to key by session id rather than request id since a
//! chat stream is the unit of cancellation this spec's `/api/cancel` route
//! addresses.

use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
pub struct CancelCoordinator {
    tokens: Arc<DashMap<String, CancellationToken>>,
}

impl CancelCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin tracking cancellation for `session_id`, replacing any prior
    /// handle for that session (spec.md §4.6: "replacing any prior handle").
    pub fn begin(&self, session_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.insert(session_id.to_string(), token.clone());
        token
    }

    /// Abort the in-flight operation for `session_id`, if any.
    pub fn cancel(&self, session_id: &str) -> bool {
        if let Some((_, token)) = self.tokens.remove(session_id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub fn end(&self, session_id: &str) {
        self.tokens.remove(session_id);
    }

    pub fn is_cancelled(&self, session_id: &str) -> bool {
        self.tokens
            .get(session_id)
            .map(|t| t.is_cancelled())
            .unwrap_or(false)
    }

    /// Cancel everything, used by shutdown.
    pub fn cancel_all(&self) {
        for entry in self.tokens.iter() {
            entry.value().cancel();
        }
        self.tokens.clear();
    }
}
