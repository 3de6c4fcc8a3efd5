//! Session data model (spec.md §3).

pub mod lifecycle;

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// Opaque, cryptographically random session identifier (>=128 bits).
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Initializing,
    Ready,
    ShuttingDown,
    Closed,
}

/// A recently-sent outbound event, retained for the session's ring buffer.
#[derive(Debug, Clone)]
pub struct RecentEvent {
    pub id: u64,
    pub event: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub state: SessionState,
    pub negotiated_protocol_version: Option<String>,
    pub client_info: Option<crate::protocol::Implementation>,
    pub created_at: u64,
    pub last_activity_at: u64,
    pub subject: Option<String>,
    pub scopes: Vec<String>,
    pub event_counter: u64,
    ring: VecDeque<RecentEvent>,
    ring_capacity: usize,
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl Session {
    pub fn new(id: String) -> Self {
        let now = now_unix();
        Self {
            id,
            state: SessionState::Uninitialized,
            negotiated_protocol_version: None,
            client_info: None,
            created_at: now,
            last_activity_at: now,
            subject: None,
            scopes: Vec::new(),
            event_counter: 0,
            ring: VecDeque::new(),
            ring_capacity: 100,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity_at = now_unix();
    }

    pub fn next_event_id(&mut self) -> u64 {
        self.event_counter += 1;
        self.event_counter
    }

    pub fn record_event(&mut self, id: u64, event: impl Into<String>) {
        if self.ring.len() >= self.ring_capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(RecentEvent {
            id,
            event: event.into(),
        });
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, SessionState::Closed)
    }
}
