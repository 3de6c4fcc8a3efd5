//! Per-session state machine (spec.md §4.1).
//!
//! `uninitialized -> initializing -> ready -> shutting_down -> closed`.
//! Grounded in the teacher's `DashMap`-backed session maps
//! (`server/streamable_http_server.rs`'s `ServerState::sessions`), generalized
//! into an explicit state machine rather than a single `initialized: bool`.

use dashmap::DashMap;
use std::sync::Arc;

use crate::error::{Error, ErrorCode, Result};
use crate::protocol::{self, Implementation, InitializeParams, ServerCapabilities};
use crate::session::{new_session_id, Session, SessionState};

/// Outcome of a successful `initialize` call.
pub struct InitializeOutcome {
    pub session_id: String,
    pub server_info: Implementation,
    pub negotiated_version: String,
    pub capabilities: ServerCapabilities,
}

#[derive(Clone)]
pub struct LifecycleManager {
    sessions: Arc<DashMap<String, Session>>,
    server_info: Implementation,
}

impl LifecycleManager {
    pub fn new(server_info: Implementation) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            server_info,
        }
    }

    /// Handle `initialize`. `existing_session_id` is `Some` only on the
    /// stateful HTTP transport when a client retries with a known id.
    pub fn initialize(
        &self,
        existing_session_id: Option<&str>,
        params: &InitializeParams,
    ) -> Result<InitializeOutcome> {
        if !protocol::is_supported_protocol_version(&params.protocol_version) {
            return Err(Error::protocol(
                ErrorCode::INVALID_REQUEST,
                "Unsupported protocol version",
            ));
        }

        if let Some(sid) = existing_session_id {
            if let Some(existing) = self.sessions.get(sid) {
                match existing.state {
                    SessionState::Uninitialized => {},
                    SessionState::Initializing => {
                        // Idempotent retry with identical params is allowed;
                        // anything else is a conflicting re-initialize.
                        if existing.negotiated_protocol_version.as_deref()
                            != Some(params.protocol_version.as_str())
                        {
                            return Err(Error::protocol(
                                ErrorCode::INVALID_REQUEST,
                                "Session already initializing with different parameters",
                            ));
                        }
                    },
                    _ => {
                        return Err(Error::protocol(
                            ErrorCode::INVALID_REQUEST,
                            "Session already initialized",
                        ));
                    },
                }
            }
        }

        let session_id = existing_session_id
            .map(str::to_string)
            .unwrap_or_else(new_session_id);

        let mut session = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| Session::new(session_id.clone()));
        session.state = SessionState::Initializing;
        session.negotiated_protocol_version = Some(params.protocol_version.clone());
        session.client_info = Some(params.client_info.clone());
        session.touch();

        Ok(InitializeOutcome {
            session_id,
            server_info: self.server_info.clone(),
            negotiated_version: params.protocol_version.clone(),
            capabilities: ServerCapabilities {
                tools: Some(serde_json::json!({"listChanged": true})),
                logging: Some(serde_json::json!({})),
            },
        })
    }

    /// Handle `notifications/initialized`.
    pub fn mark_initialized(&self, session_id: &str) -> Result<()> {
        let mut session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| Error::lifecycle("Unknown session"))?;
        if session.state != SessionState::Initializing {
            return Err(Error::lifecycle(
                "notifications/initialized received outside the initializing state",
            ));
        }
        session.state = SessionState::Ready;
        session.touch();
        Ok(())
    }

    /// Returns Err if a request (other than `initialize` /
    /// `notifications/initialized`) may not proceed in the session's
    /// current state. Pins the stricter of the two documented source
    /// behaviours (spec.md §9 Open Questions): `METHOD_NOT_FOUND` before
    /// `ready`, uniformly across stdio and HTTP.
    pub fn require_ready(&self, session_id: &str) -> Result<()> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| Error::protocol(ErrorCode::INVALID_REQUEST, "Unknown session"))?;
        match session.state {
            SessionState::Ready => Ok(()),
            SessionState::ShuttingDown => Err(Error::lifecycle("Server is shutting down")),
            _ => Err(Error::protocol(
                ErrorCode::METHOD_NOT_FOUND,
                "Session is not initialized",
            )),
        }
    }

    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    pub fn touch(&self, session_id: &str) {
        if let Some(mut s) = self.sessions.get_mut(session_id) {
            s.touch();
        }
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Transition every non-terminal session to `shutting_down` (spec.md
    /// §4.1, §4.9). Subsequent non-notification requests fail fast.
    pub fn begin_shutdown(&self) {
        for mut entry in self.sessions.iter_mut() {
            if entry.state != SessionState::Closed {
                entry.state = SessionState::ShuttingDown;
            }
        }
    }

    pub fn close(&self, session_id: &str) {
        if let Some(mut s) = self.sessions.get_mut(session_id) {
            s.state = SessionState::Closed;
        }
    }

    pub fn is_shutting_down(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .map(|s| s.state == SessionState::ShuttingDown)
            .unwrap_or(false)
    }
}
