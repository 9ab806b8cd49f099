//! Collaborator contract shared by every leaf interface.
//!
//! A collaborator receives `{action, params}` and answers with either
//! `{data, tokensUsed}` or `{error}`. It reports failure through the return
//! value and never panics across this boundary.

use serde::Serialize;
use serde_json::{Map, Value};
use tokentree_core::{InterfaceKind, Operation};

/// Input to a collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct ExternalCall {
    #[serde(rename = "action")]
    pub operation: Operation,
    pub params: Map<String, Value>,
}

impl ExternalCall {
    pub fn new(operation: Operation, params: Map<String, Value>) -> Self {
        Self { operation, params }
    }

    pub fn str_param(&self, key: &str) -> Result<&str, ExternalFailure> {
        self.params
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| ExternalFailure::new(format!("parameter '{}' must be a string", key)))
    }

    pub fn u64_param(&self, key: &str) -> Result<u64, ExternalFailure> {
        self.params
            .get(key)
            .and_then(Value::as_u64)
            .ok_or_else(|| ExternalFailure::new(format!("parameter '{}' must be an integer", key)))
    }

    pub fn opt_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(Value::as_u64)
    }

    pub fn object_param(&self, key: &str) -> Result<&Map<String, Value>, ExternalFailure> {
        self.params
            .get(key)
            .and_then(Value::as_object)
            .ok_or_else(|| ExternalFailure::new(format!("parameter '{}' must be an object", key)))
    }

    pub fn array_param(&self, key: &str) -> Result<&Vec<Value>, ExternalFailure> {
        self.params
            .get(key)
            .and_then(Value::as_array)
            .ok_or_else(|| ExternalFailure::new(format!("parameter '{}' must be an array", key)))
    }
}

/// Successful collaborator output.
#[derive(Debug, Clone, Serialize)]
pub struct ExternalResponse {
    pub data: Map<String, Value>,
    /// The collaborator's own accounting of the call's cost.
    #[serde(rename = "tokensUsed")]
    pub tokens_used: u64,
}

impl ExternalResponse {
    /// Build a response whose cost is the serialized size of `data` over `divisor`.
    pub fn sized(data: Value, divisor: u64) -> Self {
        let bytes = data.to_string().len() as u64;
        let data = match data {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".into(), other);
                map
            }
        };
        Self {
            data,
            tokens_used: bytes / divisor.max(1),
        }
    }
}

/// Failed collaborator output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalFailure {
    #[serde(rename = "error")]
    pub message: String,
}

impl ExternalFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ExternalFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

pub type ExternalResult = std::result::Result<ExternalResponse, ExternalFailure>;

/// An external system reachable from exactly one kind of leaf.
pub trait Collaborator: Send + Sync {
    /// Interface this collaborator implements.
    fn kind(&self) -> InterfaceKind;

    /// Perform one call.
    fn invoke(&self, call: &ExternalCall) -> ExternalResult;
}

/// Reject an operation the collaborator does not implement.
pub(crate) fn unsupported(kind: InterfaceKind, op: Operation) -> ExternalResult {
    Err(ExternalFailure::new(format!("{} does not support '{}'", kind, op)))
}
