//! Tool invocation: validation, timeout, error-as-result semantics (spec.md §4.3).

use serde_json::Value;

use crate::tools::{registry::ToolRegistry, schema, ToolResult};

#[derive(Clone)]
pub struct ToolExecutor {
    registry: ToolRegistry,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Execute `name` with `args`. Never returns `Err` for a tool-level
    /// failure — unknown tool, validation failure, timeout, or handler
    /// panic all surface as `ToolResult { is_error: true, .. }` inside a
    /// successful JSON-RPC response (spec.md §4.3, §7: "models must reason
    /// over these").
    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        let Some(tool) = self.registry.get(name) else {
            return ToolResult::error(format!("Unknown tool: {name}"));
        };

        let violations = schema::validate(&tool.input_schema, &args);
        if !violations.is_empty() {
            let detail = violations
                .iter()
                .map(|v| format!("{}: {}", v.path, v.message))
                .collect::<Vec<_>>()
                .join("; ");
            return ToolResult::error(format!("Invalid arguments: {detail}"));
        }

        let handler = tool.handler.clone();
        let call = handler.call(args);

        match tokio::time::timeout(tool.timeout, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => ToolResult::error(err.sanitized_message()),
            Err(_elapsed) => ToolResult::error(format!("Tool \"{name}\" timed out")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{ToolContent, Tool};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn registry_with(tool: Tool) -> ToolRegistry {
        let registry = ToolRegistry::new("secret");
        registry.register(tool).unwrap();
        registry
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_result_not_an_err() {
        let executor = ToolExecutor::new(ToolRegistry::new("secret"));
        let result = executor.execute("nope", json!({})).await;
        assert!(result.is_error);
        let ToolContent::Text { text } = &result.content[0];
        assert!(text.contains("nope"));
    }

    #[tokio::test]
    async fn validation_failure_does_not_invoke_handler() {
        let invoked = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let invoked_clone = invoked.clone();
        let tool = Tool {
            name: "needs_name".to_string(),
            title: None,
            description: "d".to_string(),
            input_schema: json!({"type": "object", "required": ["name"]}),
            annotations: None,
            timeout: Duration::from_secs(5),
            handler: Arc::new(move |_args: Value| {
                let invoked = invoked_clone.clone();
                async move {
                    invoked.store(true, std::sync::atomic::Ordering::SeqCst);
                    Ok(ToolResult::ok(vec![ToolContent::text("ok")]))
                }
            }),
        };
        let executor = ToolExecutor::new(registry_with(tool));
        let result = executor.execute("needs_name", json!({})).await;
        assert!(result.is_error);
        assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn handler_timeout_becomes_error_result() {
        let tool = Tool {
            name: "slow".to_string(),
            title: None,
            description: "d".to_string(),
            input_schema: json!({"type": "object"}),
            annotations: None,
            timeout: Duration::from_millis(10),
            handler: Arc::new(|_args: Value| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(ToolResult::ok(vec![]))
            }),
        };
        let executor = ToolExecutor::new(registry_with(tool));
        let result = executor.execute("slow", json!({})).await;
        assert!(result.is_error);
        let ToolContent::Text { text } = &result.content[0];
        assert!(text.contains("timed out"));
    }

    #[tokio::test]
    async fn handler_error_is_sanitized() {
        let tool = Tool {
            name: "broken".to_string(),
            title: None,
            description: "d".to_string(),
            input_schema: json!({"type": "object"}),
            annotations: None,
            timeout: Duration::from_secs(5),
            handler: Arc::new(|_args: Value| async {
                Err(crate::error::Error::internal("/etc/passwd leaked in a stack trace"))
            }),
        };
        let executor = ToolExecutor::new(registry_with(tool));
        let result = executor.execute("broken", json!({})).await;
        assert!(result.is_error);
        let ToolContent::Text { text } = &result.content[0];
        assert!(!text.contains("/etc/passwd"));
    }

    #[tokio::test]
    async fn successful_handler_result_passes_through() {
        let tool = Tool {
            name: "ok".to_string(),
            title: None,
            description: "d".to_string(),
            input_schema: json!({"type": "object"}),
            annotations: None,
            timeout: Duration::from_secs(5),
            handler: Arc::new(|_args: Value| async {
                Ok(ToolResult::ok(vec![ToolContent::text("8")]))
            }),
        };
        let executor = ToolExecutor::new(registry_with(tool));
        let result = executor.execute("ok", json!({})).await;
        assert!(!result.is_error);
    }
}
