//! HTTP + SSE transport: routing, origin/CORS, protocol-version and
//! bearer-auth gates, dispatch to the shared [`super::dispatch`] (spec.md
//! §4.4).
//!
//! Route shape and `ServerState`-as-`Arc`-bundle pattern are grounded in
//! the teacher's `server::streamable_http_server` (`Router::new().route("/",
//! post(..)).route("/", get(..))`), generalized from a single MCP root
//! route into this spec's wider surface (chat, cancel, health, OAuth).

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as SseAxumEvent, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::auth::authenticator::Authenticator;
use crate::auth::oauth::{AuthorizeOutcome, AuthorizeParams, LoginParams, OAuthServer};
use crate::auth::AuthContext;
use crate::health::HealthSurface;
use crate::protocol::{
    is_supported_protocol_version, ClientCapabilities, ErrorEnvelope, Implementation,
    InitializeParams, JsonRpcMessage, JsonRpcResponse, RequestId, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::transport::{dispatch, Dependencies};

const MCP_PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";
const LAST_EVENT_ID_HEADER: &str = "last-event-id";

#[derive(Clone)]
pub struct AppState {
    pub deps: Dependencies,
    pub authenticator: Option<Arc<Authenticator>>,
    pub oauth: Arc<OAuthServer>,
    pub health: HealthSurface,
    pub allowed_origins: Vec<String>,
    /// spec.md §4.4: "every request must embed all state; no session is
    /// created; `/mcp` GET is disabled."
    pub stateless: bool,
}

pub fn router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.allowed_origins);
    let stateless = state.stateless;

    let mcp_route = if stateless { post(handle_rpc) } else { post(handle_rpc).get(handle_sse) };

    Router::new()
        .route("/mcp", mcp_route)
        .route("/api/chat", post(handle_chat))
        .route("/api/cancel", post(handle_cancel))
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/oauth/authorize", get(handle_authorize))
        .route("/oauth/login", post(handle_login))
        .route("/oauth/token", post(handle_token))
        .layer(cors)
        .with_state(Arc::new(state))
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<_> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}

fn protocol_version_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(MCP_PROTOCOL_VERSION_HEADER).and_then(|v| v.to_str().ok())
}

fn session_id_header(headers: &HeaderMap) -> Option<String> {
    headers.get(MCP_SESSION_ID_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn bearer_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok())
}

/// spec.md §4.4 pipeline step 2: every route but a bare `initialize` must
/// carry a supported `mcp-protocol-version` header.
fn require_protocol_version_header(headers: &HeaderMap) -> Result<(), Response> {
    match protocol_version_header(headers) {
        Some(v) if is_supported_protocol_version(v) => Ok(()),
        _ => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_request", "error_description": "missing or unsupported mcp-protocol-version header"})),
        )
            .into_response()),
    }
}

/// POST `/mcp` — JSON-RPC over HTTP (spec.md §4.4, §6).
async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(message): Json<JsonRpcMessage>,
) -> Response {
    // A version header is required on every request except the very
    // first `initialize` (no session yet to have negotiated one against).
    if message.method != "initialize" {
        if let Err(response) = require_protocol_version_header(&headers) {
            return response;
        }
    }

    let auth_context = match authenticate(&state, &headers) {
        Ok(ctx) => ctx,
        Err(response) => return response,
    };

    let Some(_in_flight) = state.health.coordinator().begin_request() else {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"error": "server_shutting_down"}))).into_response();
    };

    if state.stateless {
        return dispatch_stateless(&state, &headers, auth_context, message).await;
    }

    let session_id = session_id_header(&headers);
    let result = dispatch(&state.deps, session_id.as_deref(), auth_context.as_ref(), message).await;

    let mut response_headers = HeaderMap::new();
    if let Some(sid) = &result.session_id {
        if let Ok(value) = sid.parse() {
            response_headers.insert(MCP_SESSION_ID_HEADER, value);
        }
    }

    match result.response {
        Some(envelope) => (StatusCode::OK, response_headers, Json(envelope)).into_response(),
        None => (StatusCode::ACCEPTED, response_headers).into_response(),
    }
}

/// Stateless mode (spec.md §4.4): each request is given a throw-away
/// session just long enough to satisfy method dispatch, then the session
/// is closed before the response goes out — nothing survives to the next
/// request, and no `mcp-session-id` is ever handed back to the client.
async fn dispatch_stateless(
    state: &AppState,
    headers: &HeaderMap,
    auth_context: Option<AuthContext>,
    message: JsonRpcMessage,
) -> Response {
    if message.method == "initialize" {
        let result = dispatch(&state.deps, None, auth_context.as_ref(), message).await;
        if let Some(sid) = &result.session_id {
            state.deps.lifecycle.close(sid);
        }
        return match result.response {
            Some(envelope) => (StatusCode::OK, Json(envelope)).into_response(),
            None => StatusCode::ACCEPTED.into_response(),
        };
    }

    let request_id = message.id.clone().unwrap_or(RequestId::Number(0));
    let protocol_version = protocol_version_header(headers)
        .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0])
        .to_string();

    let init = state.deps.lifecycle.initialize(
        None,
        &InitializeParams {
            protocol_version,
            capabilities: ClientCapabilities::default(),
            client_info: Implementation { name: "stateless".to_string(), version: "0".to_string() },
        },
    );
    let ephemeral_id = match init {
        Ok(outcome) => outcome.session_id,
        Err(err) => {
            let envelope = ErrorEnvelope::new(err.code(), err.sanitized_message());
            return (StatusCode::OK, Json(JsonRpcResponse::failure(request_id, envelope))).into_response();
        },
    };
    let _ = state.deps.lifecycle.mark_initialized(&ephemeral_id);

    let result = dispatch(&state.deps, Some(&ephemeral_id), auth_context.as_ref(), message).await;
    state.deps.lifecycle.close(&ephemeral_id);

    match result.response {
        Some(envelope) => (StatusCode::OK, Json(envelope)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Option<AuthContext>, Response> {
    let Some(authenticator) = &state.authenticator else {
        return Ok(None);
    };
    match authenticator.authenticate(bearer_header(headers)) {
        Ok(ctx) => Ok(Some(ctx)),
        Err(_) => Err((
            StatusCode::UNAUTHORIZED,
            [(axum::http::header::WWW_AUTHENTICATE, "Bearer")],
            Json(json!({"error": "invalid_token"})),
        )
            .into_response()),
    }
}

/// GET `/mcp` — attach to a session's event stream (spec.md §4.4, §4.5).
/// Like every non-`initialize` route, this requires a supported
/// `mcp-protocol-version` header and a bearer token (spec.md §4.4 steps 2-3).
async fn handle_sse(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = require_protocol_version_header(&headers) {
        return response;
    }
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }
    let Some(session_id) = session_id_header(&headers) else {
        return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_request", "error_description": "mcp-session-id header required"}))).into_response();
    };

    let last_event_id = headers
        .get(LAST_EVENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let consumer = state.deps.broker.attach(&session_id, last_event_id).await;
    let stream = tokio_stream::wrappers::ReceiverStream::new(consumer.receiver).map(|event| {
        Ok(SseAxumEvent::default().id(event.id.to_string()).event(event.event.clone()).json_data(event.data).unwrap_or_else(|_| SseAxumEvent::default()))
    });

    Sse::new(stream)
        .keep_alive(axum::response::sse::KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}

#[derive(Debug, Deserialize)]
struct ChatRequestBody {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(flatten)]
    rest: Value,
}

/// POST `/api/chat` — kick off a chat turn; deltas arrive via `GET /mcp`
/// (spec.md §4.6). Protected per spec.md §4.4 step 3.
async fn handle_chat(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(body): Json<ChatRequestBody>) -> Response {
    if let Err(response) = require_protocol_version_header(&headers) {
        return response;
    }
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }

    let Some(chat) = state.deps.chat.clone() else {
        return (StatusCode::NOT_IMPLEMENTED, Json(json!({"error": "chat is not configured"}))).into_response();
    };
    let session_id = body.session_id.clone();
    let request = body.rest;
    tokio::spawn(async move {
        chat.stream(&session_id, request).await;
    });
    (StatusCode::ACCEPTED, Json(json!({"status": "streaming"}))).into_response()
}

#[derive(Debug, Deserialize)]
struct CancelBody {
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// POST `/api/cancel` — abort the in-flight chat/tool call for a session.
/// Protected per spec.md §4.4 step 3.
async fn handle_cancel(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(body): Json<CancelBody>) -> Response {
    if let Err(response) = require_protocol_version_header(&headers) {
        return response;
    }
    if let Err(response) = authenticate(&state, &headers) {
        return response;
    }

    let cancelled = state.deps.cancel.cancel(&body.session_id);
    (StatusCode::OK, Json(json!({"cancelled": cancelled}))).into_response()
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Response {
    Json(state.health.liveness()).into_response()
}

async fn handle_ready(State(state): State<Arc<AppState>>) -> Response {
    let report = state.health.readiness();
    let status = if report.status == crate::health::Status::Ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(report)).into_response()
}

/// Re-encode the validated authorize params for embedding in the login
/// form's hidden field (spec.md §4.7: "Render a login form embedding the
/// original query string").
fn authorize_query_string(params: &AuthorizeParams) -> String {
    format!(
        "response_type={}&client_id={}&redirect_uri={}&code_challenge={}&code_challenge_method={}&state={}",
        urlencoding::encode(&params.response_type),
        urlencoding::encode(&params.client_id),
        urlencoding::encode(&params.redirect_uri),
        urlencoding::encode(&params.code_challenge),
        urlencoding::encode(&params.code_challenge_method),
        urlencoding::encode(&params.state),
    )
}

async fn handle_authorize(State(state): State<Arc<AppState>>, axum::extract::Query(params): axum::extract::Query<AuthorizeParams>) -> Response {
    match state.oauth.authorize(&params) {
        AuthorizeOutcome::ShowLoginForm => {
            let qs = authorize_query_string(&params);
            Response::builder()
                .status(StatusCode::OK)
                .header(axum::http::header::CONTENT_TYPE, "text/html")
                .body(axum::body::Body::from(format!(
                    "<form method=\"post\" action=\"/oauth/login\"><input type=\"hidden\" name=\"_qs\" value=\"{qs}\"/></form>"
                )))
                .unwrap()
                .into_response()
        },
        AuthorizeOutcome::PreRedirectError(err) => (StatusCode::BAD_REQUEST, Json(err)).into_response(),
        AuthorizeOutcome::RedirectError { redirect_uri, error } => {
            let location = format!("{redirect_uri}?error={}&state=", error.error);
            Response::builder()
                .status(StatusCode::FOUND)
                .header(axum::http::header::LOCATION, location)
                .body(axum::body::Body::empty())
                .unwrap()
                .into_response()
        },
    }
}

async fn handle_login(State(state): State<Arc<AppState>>, Form(params): Form<LoginParams>) -> Response {
    match state.oauth.login(&params) {
        Ok((code, state_value)) => {
            let location = format!("{}?code={code}&state={state_value}", params.redirect_uri);
            Response::builder()
                .status(StatusCode::FOUND)
                .header(axum::http::header::LOCATION, location)
                .body(axum::body::Body::empty())
                .unwrap()
                .into_response()
        },
        Err(err) => (StatusCode::BAD_REQUEST, Json(err)).into_response(),
    }
}

// A flat struct rather than an internally-tagged enum: form-urlencoded
// bodies aren't a self-describing format, so serde's tagged-enum content
// buffering doesn't work reliably against `Form`'s deserializer.
#[derive(Debug, Deserialize)]
struct TokenRequestBody {
    grant_type: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    redirect_uri: Option<String>,
    #[serde(default)]
    code_verifier: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

async fn handle_token(State(state): State<Arc<AppState>>, Form(body): Form<TokenRequestBody>) -> Response {
    let result = match body.grant_type.as_str() {
        "authorization_code" => match (body.code, body.redirect_uri, body.code_verifier) {
            (Some(code), Some(redirect_uri), Some(code_verifier)) => {
                state.oauth.exchange_code(&code, &redirect_uri, &code_verifier)
            },
            _ => Err(crate::auth::oauth::OAuthError::new(
                "invalid_request",
                Some("code, redirect_uri, and code_verifier are required".to_string()),
            )),
        },
        "refresh_token" => match body.refresh_token {
            Some(refresh_token) => state.oauth.refresh(&refresh_token),
            None => Err(crate::auth::oauth::OAuthError::new(
                "invalid_request",
                Some("refresh_token is required".to_string()),
            )),
        },
        other => Err(crate::auth::oauth::OAuthError::new(
            "unsupported_grant_type",
            Some(format!("unsupported grant_type: {other}")),
        )),
    };

    match result {
        Ok(token) => Json(token).into_response(),
        Err(err) => (StatusCode::BAD_REQUEST, Json(err)).into_response(),
    }
}
