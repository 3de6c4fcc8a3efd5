//! A small demonstration tool, supplemented to ground the end-to-end
//! scenarios in spec.md §8 (S2, S3, S4) in a concrete, registerable tool.
//! Business logic for real tools is out of scope (spec.md §1); this one
//! exists purely so the executor has something to call.

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::tools::{Tool, ToolContent, ToolResult};

pub fn calculate_tool() -> Tool {
    Tool {
        name: "calculate".to_string(),
        title: Some("Calculate".to_string()),
        description: "Perform a basic arithmetic operation on two numbers.".to_string(),
        input_schema: json!({
            "type": "object",
            "required": ["operation", "a", "b"],
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["add", "subtract", "multiply", "divide"]
                },
                "a": {"type": "number"},
                "b": {"type": "number"}
            }
        }),
        annotations: Some(crate::tools::ToolAnnotations {
            read_only_hint: Some(true),
            destructive_hint: Some(false),
            idempotent_hint: Some(true),
            open_world_hint: Some(false),
        }),
        timeout: Duration::from_secs(30),
        handler: Arc::new(calculate_handler),
    }
}

async fn calculate_handler(args: Value) -> Result<ToolResult> {
    let operation = args.get("operation").and_then(Value::as_str).unwrap_or("");
    let a = args.get("a").and_then(Value::as_f64).unwrap_or(0.0);
    let b = args.get("b").and_then(Value::as_f64).unwrap_or(0.0);

    let result = match operation {
        "add" => a + b,
        "subtract" => a - b,
        "multiply" => a * b,
        "divide" => {
            if b == 0.0 {
                return Ok(ToolResult::error("Division by zero is not allowed"));
            }
            a / b
        },
        other => return Ok(ToolResult::error(format!("Unknown operation: {other}"))),
    };

    let text = if result.fract() == 0.0 {
        format!("{}", result as i64)
    } else {
        format!("{result}")
    };

    Ok(ToolResult::ok(vec![ToolContent::text(text)]))
}
