//! Fixed registry of callable tools.

use serde_json::{json, Map, Value};
use tokentree_core::{InterfaceKind, Operation};
use tracing::debug;

use crate::collaborator::{
    unsupported, Collaborator, ExternalCall, ExternalFailure, ExternalResponse, ExternalResult,
};

/// Tools the mock knows about.
pub const TOOLS: [&str; 3] = ["echo", "word_count", "sum"];

#[derive(Default)]
pub struct MockToolApi;

impl MockToolApi {
    pub fn new() -> Self {
        Self
    }

    fn run(tool: &str, args: &Map<String, Value>) -> Result<Value, ExternalFailure> {
        match tool {
            "echo" => Ok(Value::Object(args.clone())),
            "word_count" => {
                let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
                Ok(json!(text.split_whitespace().count()))
            }
            "sum" => {
                let values = args
                    .get("values")
                    .and_then(Value::as_array)
                    .ok_or_else(|| ExternalFailure::new("sum requires a 'values' array"))?;
                let total: f64 = values.iter().filter_map(Value::as_f64).sum();
                Ok(json!(total))
            }
            other => Err(ExternalFailure::new(format!("unknown tool '{}'", other))),
        }
    }
}

impl Collaborator for MockToolApi {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::ToolApi
    }

    fn invoke(&self, call: &ExternalCall) -> ExternalResult {
        match call.operation {
            Operation::Call => {
                let tool = call.str_param("tool")?;
                let empty = Map::new();
                let args = call
                    .params
                    .get("args")
                    .and_then(Value::as_object)
                    .unwrap_or(&empty);
                let output = Self::run(tool, args)?;
                debug!("tool call: tool={}", tool);
                Ok(ExternalResponse::sized(
                    json!({ "tool": tool, "output": output }),
                    20,
                ))
            }
            Operation::List => Ok(ExternalResponse::sized(json!({ "tools": TOOLS }), 50)),
            Operation::Validate => {
                let tool = call.str_param("tool")?;
                Ok(ExternalResponse::sized(
                    json!({ "tool": tool, "valid": TOOLS.contains(&tool) }),
                    50,
                ))
            }
            op => unsupported(self.kind(), op),
        }
    }
}
