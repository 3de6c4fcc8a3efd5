//! End-to-end tool execution through the registry + executor + builtin
//! `calculate` tool, grounding spec.md S2-S4.

use agent_protocol_server::tools::builtin::calculate_tool;
use agent_protocol_server::tools::executor::ToolExecutor;
use agent_protocol_server::tools::registry::ToolRegistry;
use agent_protocol_server::tools::ToolContent;
use serde_json::json;

fn executor() -> ToolExecutor {
    let registry = ToolRegistry::new("integration-secret");
    registry.register(calculate_tool()).unwrap();
    ToolExecutor::new(registry)
}

#[tokio::test]
async fn every_arithmetic_operation_produces_the_expected_result() {
    let executor = executor();
    let cases = [
        ("add", 2.0, 3.0, "5"),
        ("subtract", 5.0, 3.0, "2"),
        ("multiply", 4.0, 3.0, "12"),
        ("divide", 9.0, 3.0, "3"),
    ];
    for (op, a, b, expected) in cases {
        let result = executor.execute("calculate", json!({"operation": op, "a": a, "b": b})).await;
        assert!(!result.is_error, "{op} should not error");
        let ToolContent::Text { text } = &result.content[0];
        assert_eq!(text, expected, "unexpected result for {op}");
    }
}

#[tokio::test]
async fn missing_required_argument_fails_schema_validation_before_invocation() {
    let executor = executor();
    let result = executor.execute("calculate", json!({"operation": "add", "a": 1})).await;
    assert!(result.is_error);
    let ToolContent::Text { text } = &result.content[0];
    assert!(text.contains("Invalid arguments"));
}

#[tokio::test]
async fn unsupported_operation_value_is_rejected_by_the_enum_constraint() {
    let executor = executor();
    let result = executor.execute("calculate", json!({"operation": "modulo", "a": 1, "b": 2})).await;
    assert!(result.is_error);
}

#[tokio::test]
async fn calling_an_unregistered_tool_name_is_an_error_result() {
    let executor = executor();
    let result = executor.execute("not_registered", json!({})).await;
    assert!(result.is_error);
}
