//! Drives the real `axum::Router` through `tower::ServiceExt::oneshot`
//! (no socket bound) to cover the HTTP transport's request/response
//! contract end to end (spec.md §8 S2-S5).

use agent_protocol_server::auth::oauth::{OAuthClient, OAuthServer, User};
use agent_protocol_server::auth::{Authenticator, JwtIssuer};
use agent_protocol_server::cancel::CancelCoordinator;
use agent_protocol_server::health::HealthSurface;
use agent_protocol_server::protocol::Implementation;
use agent_protocol_server::session::lifecycle::LifecycleManager;
use agent_protocol_server::shutdown::ShutdownCoordinator;
use agent_protocol_server::sse::SseBroker;
use agent_protocol_server::tools::builtin::calculate_tool;
use agent_protocol_server::tools::executor::ToolExecutor;
use agent_protocol_server::tools::registry::ToolRegistry;
use agent_protocol_server::transport::http::{router, AppState};
use agent_protocol_server::transport::Dependencies;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn jwt() -> JwtIssuer {
    JwtIssuer::new("http-test-secret", "agent-protocol-server", "agent-clients", Duration::from_secs(3600))
}

fn state_with_auth(auth_enabled: bool) -> AppState {
    let lifecycle = Arc::new(LifecycleManager::new(Implementation {
        name: "agent-protocol-server".to_string(),
        version: "0.1.0".to_string(),
    }));
    let registry = ToolRegistry::new("http-test-cursor-secret");
    registry.register(calculate_tool()).unwrap();
    let executor = ToolExecutor::new(registry.clone());
    let deps = Dependencies {
        lifecycle: lifecycle.clone(),
        registry,
        executor,
        broker: SseBroker::new(),
        cancel: CancelCoordinator::new(),
        chat: None,
    };
    let shutdown = Arc::new(ShutdownCoordinator::new(lifecycle));
    let oauth = Arc::new(OAuthServer::new(
        vec![OAuthClient { client_id: "c".to_string(), redirect_uri: "https://app.example/cb".to_string() }],
        vec![User { username: "alice".to_string(), password: "pw".to_string(), scope: "mcp:read mcp:write".to_string() }],
        jwt(),
        Duration::from_secs(3600),
        Duration::from_secs(86_400),
    ));
    AppState {
        deps,
        authenticator: auth_enabled.then(|| Arc::new(Authenticator::new(jwt()))),
        oauth,
        health: HealthSurface::new(shutdown),
        allowed_origins: vec!["*".to_string()],
        stateless: false,
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn rpc_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .header("mcp-protocol-version", "2025-11-25")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn initialize_over_http_returns_a_session_id_header() {
    let app = router(state_with_auth(false));
    let body = json!({
        "jsonrpc": "2.0", "id": 1, "method": "initialize",
        "params": {
            "protocolVersion": "2025-11-25",
            "capabilities": {},
            "clientInfo": {"name": "itest", "version": "1.0"}
        }
    });
    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("mcp-session-id").is_some());
}

#[tokio::test]
async fn a_request_missing_the_protocol_version_header_is_rejected_before_dispatch() {
    let app = router(state_with_auth(false));
    let body = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"});
    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_routes_reject_missing_bearer_with_401_and_www_authenticate() {
    let app = router(state_with_auth(true));
    let body = json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"});
    let response = app.oneshot(rpc_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers().get("www-authenticate").unwrap(), "Bearer");
}

#[tokio::test]
async fn a_valid_bearer_token_is_accepted_and_lists_the_registered_tool() {
    let state = state_with_auth(true);
    let token = jwt().issue("alice", "mcp:read mcp:write").unwrap();

    let init_app = router(state.clone());
    let init_body = json!({
        "jsonrpc": "2.0", "id": 1, "method": "initialize",
        "params": {"protocolVersion": "2025-11-25", "capabilities": {}, "clientInfo": {"name": "itest", "version": "1.0"}}
    });
    let init_request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(init_body.to_string()))
        .unwrap();
    let init_response = init_app.oneshot(init_request).await.unwrap();
    assert_eq!(init_response.status(), StatusCode::OK);
    let session_id = init_response.headers().get("mcp-session-id").unwrap().to_str().unwrap().to_string();

    let list_app = router(state);
    let list_body = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"});
    let list_request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .header("mcp-protocol-version", "2025-11-25")
        .header("mcp-session-id", &session_id)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::from(list_body.to_string()))
        .unwrap();
    let list_response = list_app.oneshot(list_request).await.unwrap();
    assert_eq!(list_response.status(), StatusCode::OK);
    let payload = body_json(list_response).await;
    assert_eq!(payload["result"]["tools"][0]["name"], "calculate");
}

#[tokio::test]
async fn health_and_ready_report_ok_before_any_shutdown() {
    let app = router(state_with_auth(false));
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let ready = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::OK);
}

#[tokio::test]
async fn stateless_mode_does_not_return_a_session_id_and_disables_the_sse_route() {
    let mut state = state_with_auth(false);
    state.stateless = true;
    let app = router(state);

    let body = json!({
        "jsonrpc": "2.0", "id": 1, "method": "initialize",
        "params": {
            "protocolVersion": "2025-11-25",
            "capabilities": {},
            "clientInfo": {"name": "itest", "version": "1.0"}
        }
    });
    let response = app.clone().oneshot(rpc_request(body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("mcp-session-id").is_none());

    let list_body = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"});
    let list_response = app.clone().oneshot(rpc_request(list_body)).await.unwrap();
    assert_eq!(list_response.status(), StatusCode::OK);
    assert!(list_response.headers().get("mcp-session-id").is_none());
    let payload = body_json(list_response).await;
    assert_eq!(payload["result"]["tools"][0]["name"], "calculate");

    let sse_request = Request::builder().method("GET").uri("/mcp").body(Body::empty()).unwrap();
    let sse_response = app.oneshot(sse_request).await.unwrap();
    assert_eq!(sse_response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_and_cancel_routes_reject_missing_bearer() {
    let app = router(state_with_auth(true));

    let chat_request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .header("mcp-protocol-version", "2025-11-25")
        .body(Body::from(json!({"sessionId": "s1"}).to_string()))
        .unwrap();
    let chat_response = app.clone().oneshot(chat_request).await.unwrap();
    assert_eq!(chat_response.status(), StatusCode::UNAUTHORIZED);

    let cancel_request = Request::builder()
        .method("POST")
        .uri("/api/cancel")
        .header("content-type", "application/json")
        .header("mcp-protocol-version", "2025-11-25")
        .body(Body::from(json!({"sessionId": "s1"}).to_string()))
        .unwrap();
    let cancel_response = app.oneshot(cancel_request).await.unwrap();
    assert_eq!(cancel_response.status(), StatusCode::UNAUTHORIZED);
}
