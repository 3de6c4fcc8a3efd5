//! Cross-transport equivalence (spec.md §8 property 8): stdio and HTTP
//! both call the same `transport::dispatch`, so identical JSON-RPC input
//! against independently constructed `Dependencies` must produce identical
//! responses.

use agent_protocol_server::cancel::CancelCoordinator;
use agent_protocol_server::protocol::{
    ClientCapabilities, Implementation, InitializeParams, JsonRpcMessage, RequestId,
};
use agent_protocol_server::session::lifecycle::LifecycleManager;
use agent_protocol_server::sse::SseBroker;
use agent_protocol_server::tools::builtin::calculate_tool;
use agent_protocol_server::tools::executor::ToolExecutor;
use agent_protocol_server::tools::registry::ToolRegistry;
use agent_protocol_server::transport::{dispatch, Dependencies};
use serde_json::json;

fn fresh_deps() -> Dependencies {
    let lifecycle = std::sync::Arc::new(LifecycleManager::new(Implementation {
        name: "agent-protocol-server".to_string(),
        version: "0.1.0".to_string(),
    }));
    let registry = ToolRegistry::new("shared-secret");
    registry.register(calculate_tool()).unwrap();
    let executor = ToolExecutor::new(registry.clone());
    Dependencies {
        lifecycle,
        registry,
        executor,
        broker: SseBroker::new(),
        cancel: CancelCoordinator::new(),
        chat: None,
    }
}

fn init_message() -> JsonRpcMessage {
    JsonRpcMessage {
        jsonrpc: Some("2.0".to_string()),
        id: Some(RequestId::Number(1)),
        method: "initialize".to_string(),
        params: Some(
            serde_json::to_value(InitializeParams {
                protocol_version: "2025-11-25".to_string(),
                capabilities: ClientCapabilities::default(),
                client_info: Implementation { name: "test".to_string(), version: "1.0".to_string() },
            })
            .unwrap(),
        ),
    }
}

/// Run the same initialize -> initialized -> tools/call sequence through
/// `dispatch` the way each transport does (stdio without an `AuthContext`,
/// HTTP with one) and return the `tools/call` result payload.
async fn run_sequence(deps: &Dependencies, auth: Option<&agent_protocol_server::auth::AuthContext>) -> serde_json::Value {
    let init = dispatch(deps, None, auth, init_message()).await;
    let session_id = init.session_id.unwrap();

    dispatch(
        deps,
        Some(&session_id),
        auth,
        JsonRpcMessage {
            jsonrpc: Some("2.0".to_string()),
            id: None,
            method: "notifications/initialized".to_string(),
            params: None,
        },
    )
    .await;

    let call = dispatch(
        deps,
        Some(&session_id),
        auth,
        JsonRpcMessage {
            jsonrpc: Some("2.0".to_string()),
            id: Some(RequestId::Number(2)),
            method: "tools/call".to_string(),
            params: Some(json!({"name": "calculate", "arguments": {"operation": "add", "a": 20, "b": 22}})),
        },
    )
    .await;

    call.response.unwrap().result.unwrap()
}

#[tokio::test]
async fn stdio_style_and_http_style_dispatch_agree_on_the_same_sequence() {
    let stdio_deps = fresh_deps();
    let http_deps = fresh_deps();

    // Stdio never authenticates; HTTP attaches an AuthContext with the
    // required scopes. Dispatch's method routing must be indifferent to
    // which path produced the context, as long as the scope check passes.
    let http_auth = agent_protocol_server::auth::AuthContext {
        subject: "alice".to_string(),
        scopes: vec!["mcp:read".to_string(), "mcp:write".to_string()],
    };

    let stdio_result = run_sequence(&stdio_deps, None).await;
    let http_result = run_sequence(&http_deps, Some(&http_auth)).await;

    assert_eq!(stdio_result, http_result);
    assert_eq!(stdio_result["content"][0]["text"], "42");
}

#[tokio::test]
async fn unknown_method_produces_an_identical_error_on_both_paths() {
    let deps_a = fresh_deps();
    let deps_b = fresh_deps();
    let msg = |method: &str| JsonRpcMessage {
        jsonrpc: Some("2.0".to_string()),
        id: Some(RequestId::Number(1)),
        method: method.to_string(),
        params: None,
    };

    let a = dispatch(&deps_a, None, None, msg("bogus")).await;
    let b = dispatch(&deps_b, None, None, msg("bogus")).await;
    assert_eq!(a.response.unwrap().error.unwrap().code, b.response.unwrap().error.unwrap().code);
}
