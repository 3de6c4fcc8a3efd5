//! Line-delimited JSON-RPC over stdin/stdout (spec.md §4, §5, §6).
//!
//! Grounded in the teacher's `shared::stdio::StdioTransport`: newline-
//! delimited framing, a `Mutex`-guarded stdout writer serializing
//! concurrent writes, and an `AtomicBool` "closed" flag. The teacher's
//! transport is generic over message direction (it's also a client
//! transport); this one is server-only, so `run` owns the read loop and
//! dispatches directly rather than exposing `send`/`receive`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::protocol::JsonRpcMessage;
use crate::transport::{dispatch, Dependencies};

pub struct StdioTransport {
    deps: Dependencies,
    closed: AtomicBool,
}

impl StdioTransport {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps, closed: AtomicBool::new(false) }
    }

    /// Run the framing loop until stdin reaches EOF or `close` is called.
    /// One task per session is not needed on stdio: spec.md §5 says
    /// requests dispatch to handlers that "may run in parallel tasks",
    /// while writes are serialized through a single writer.
    pub async fn run(self: Arc<Self>) {
        let stdin = tokio::io::stdin();
        let mut reader = BufReader::new(stdin);
        let stdout = Arc::new(Mutex::new(tokio::io::stdout()));
        let mut session_id: Option<String> = None;

        let mut line = String::new();
        loop {
            if self.closed.load(Ordering::Acquire) {
                break;
            }
            line.clear();
            let bytes_read = match reader.read_line(&mut line).await {
                Ok(n) => n,
                Err(err) => {
                    warn!(error = %err, "stdio read error");
                    break;
                },
            };
            if bytes_read == 0 {
                break; // EOF
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let message: JsonRpcMessage = match serde_json::from_str(trimmed) {
                Ok(m) => m,
                Err(err) => {
                    debug!(error = %err, "malformed JSON-RPC line, ignoring");
                    continue;
                },
            };

            let result = dispatch(&self.deps, session_id.as_deref(), None, message).await;
            if let Some(sid) = result.session_id {
                session_id = Some(sid);
            }
            if let Some(response) = result.response {
                if let Ok(bytes) = serde_json::to_vec(&response) {
                    let mut stdout = stdout.lock().await;
                    let _ = stdout.write_all(&bytes).await;
                    let _ = stdout.write_all(b"\n").await;
                    let _ = stdout.flush().await;
                }
            }
        }
    }

    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}
