//! Drives an external model producer and republishes its deltas as SSE
//! events (spec.md §4.6).
//!
//! There is no teacher analogue for "talk to a model" — the teacher's SDK
//! is itself the thing model clients talk through. The event sequencing
//! and cancellation wiring are grounded in `server::cancellation` (token
//! per session, replacing any prior handle) and `sse::SseBroker` (ordering
//! of published events), both already built in this crate.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cancel::CancelCoordinator;
use crate::sse::SseBroker;

/// One increment of a model's output. `ModelProducer` implementations
/// yield a sequence of these; `ChatStreamer` turns the sequence into SSE
/// events per spec.md §4.6's ordering rule.
#[derive(Debug, Clone)]
pub enum Delta {
    Token(String),
    ToolCall { id: String, name: String, arguments: Value },
    ToolResult { id: String, result: Value },
    Done { input_tokens: u64, output_tokens: u64 },
    Error { message: String },
}

/// The opaque external collaborator named in spec.md §1: something that,
/// given a chat request, yields a sequence of [`Delta`]s. Production
/// implementations live outside this crate (an LLM API client); this
/// crate only defines the seam.
#[async_trait]
pub trait ModelProducer: Send + Sync {
    async fn produce(
        &self,
        session_id: &str,
        request: Value,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Vec<Delta>;
}

#[derive(Clone)]
pub struct ChatStreamer {
    broker: SseBroker,
    cancel: CancelCoordinator,
    producer: Arc<dyn ModelProducer>,
}

impl ChatStreamer {
    pub fn new(broker: SseBroker, cancel: CancelCoordinator, producer: Arc<dyn ModelProducer>) -> Self {
        Self {
            broker,
            cancel,
            producer,
        }
    }

    /// Drive one chat turn for `session_id`. Acquires a cancellation token
    /// (replacing any prior handle for the session, per spec.md §4.6 and
    /// `CancelCoordinator::begin`), invokes the producer, and republishes
    /// its deltas in order. The stream always ends with exactly one
    /// `done` or `error` event.
    pub async fn stream(&self, session_id: &str, request: Value) {
        let token = self.cancel.begin(session_id);

        if token.is_cancelled() {
            self.publish_error(session_id, "cancelled").await;
            self.cancel.end(session_id);
            return;
        }

        let deltas = tokio::select! {
            deltas = self.producer.produce(session_id, request, token.clone()) => deltas,
            _ = token.cancelled() => {
                self.publish_error(session_id, "cancelled").await;
                self.cancel.end(session_id);
                return;
            }
        };

        let mut terminated = false;
        for delta in deltas {
            if token.is_cancelled() {
                self.publish_error(session_id, "cancelled").await;
                terminated = true;
                break;
            }
            match delta {
                Delta::Token(text) => {
                    self.broker.publish(session_id, "token", json!({ "text": text })).await;
                },
                Delta::ToolCall { id, name, arguments } => {
                    self.broker
                        .publish(session_id, "tool_call", json!({ "id": id, "name": name, "arguments": arguments }))
                        .await;
                },
                Delta::ToolResult { id, result } => {
                    self.broker
                        .publish(session_id, "tool_result", json!({ "id": id, "result": result }))
                        .await;
                },
                Delta::Done { input_tokens, output_tokens } => {
                    self.broker
                        .publish(
                            session_id,
                            "done",
                            json!({ "usage": { "inputTokens": input_tokens, "outputTokens": output_tokens } }),
                        )
                        .await;
                    terminated = true;
                },
                Delta::Error { message } => {
                    self.broker
                        .publish(session_id, "error", json!({ "code": "internal", "message": message }))
                        .await;
                    terminated = true;
                },
            }
            if terminated {
                break;
            }
        }

        if !terminated {
            // Producer returned without yielding a terminal delta: treat
            // as an internal error rather than leaving the stream open.
            self.publish_error_coded(session_id, "internal", "model producer ended without a terminal event")
                .await;
        }

        self.cancel.end(session_id);
    }

    async fn publish_error(&self, session_id: &str, code: &str) {
        self.publish_error_coded(session_id, code, "the request was cancelled").await;
    }

    async fn publish_error_coded(&self, session_id: &str, code: &str, message: &str) {
        self.broker
            .publish(session_id, "error", json!({ "code": code, "message": message }))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedProducer {
        deltas: Vec<Delta>,
    }

    #[async_trait]
    impl ModelProducer for ScriptedProducer {
        async fn produce(
            &self,
            _session_id: &str,
            _request: Value,
            _cancel: tokio_util::sync::CancellationToken,
        ) -> Vec<Delta> {
            self.deltas.clone()
        }
    }

    #[tokio::test]
    async fn happy_path_emits_tokens_then_done() {
        let broker = SseBroker::new();
        let cancel = CancelCoordinator::new();
        let producer = Arc::new(ScriptedProducer {
            deltas: vec![
                Delta::Token("hel".into()),
                Delta::Token("lo".into()),
                Delta::Done { input_tokens: 3, output_tokens: 2 },
            ],
        });
        let streamer = ChatStreamer::new(broker.clone(), cancel, producer);

        let mut consumer = broker.attach("s1", None).await;
        streamer.stream("s1", json!({"prompt": "hi"})).await;

        let events: Vec<_> = std::iter::from_fn(|| consumer.receiver.try_recv().ok()).collect();
        let names: Vec<_> = events.iter().map(|e| e.event.clone()).collect();
        assert_eq!(names, vec!["token", "token", "done"]);
    }

    #[tokio::test]
    async fn tool_call_is_followed_by_tool_result() {
        let broker = SseBroker::new();
        let cancel = CancelCoordinator::new();
        let producer = Arc::new(ScriptedProducer {
            deltas: vec![
                Delta::ToolCall { id: "1".into(), name: "calculate".into(), arguments: json!({}) },
                Delta::ToolResult { id: "1".into(), result: json!({"ok": true}) },
                Delta::Done { input_tokens: 1, output_tokens: 1 },
            ],
        });
        let streamer = ChatStreamer::new(broker.clone(), cancel, producer);
        let mut consumer = broker.attach("s1", None).await;
        streamer.stream("s1", json!({})).await;

        let events: Vec<_> = std::iter::from_fn(|| consumer.receiver.try_recv().ok()).collect();
        let names: Vec<_> = events.iter().map(|e| e.event.clone()).collect();
        assert_eq!(names, vec!["tool_call", "tool_result", "done"]);
    }

    #[tokio::test]
    async fn pre_cancelled_session_emits_only_error() {
        let broker = SseBroker::new();
        let cancel = CancelCoordinator::new();
        let token = cancel.begin("s1");
        token.cancel();
        let producer = Arc::new(ScriptedProducer { deltas: vec![] });
        let streamer = ChatStreamer::new(broker.clone(), cancel, producer);
        let mut consumer = broker.attach("s1", None).await;
        streamer.stream("s1", json!({})).await;

        let events: Vec<_> = std::iter::from_fn(|| consumer.receiver.try_recv().ok()).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "error");
        assert_eq!(events[0].data["code"], "cancelled");
    }

    #[tokio::test]
    async fn producer_without_terminal_delta_becomes_internal_error() {
        let broker = SseBroker::new();
        let cancel = CancelCoordinator::new();
        let producer = Arc::new(ScriptedProducer {
            deltas: vec![Delta::Token("partial".into())],
        });
        let streamer = ChatStreamer::new(broker.clone(), cancel, producer);
        let mut consumer = broker.attach("s1", None).await;
        streamer.stream("s1", json!({})).await;

        let events: Vec<_> = std::iter::from_fn(|| consumer.receiver.try_recv().ok()).collect();
        let names: Vec<_> = events.iter().map(|e| e.event.clone()).collect();
        assert_eq!(names, vec!["token", "error"]);
        assert_eq!(events[1].data["code"], "internal");
    }
}
