//! Path-keyed JSON configuration documents.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokentree_core::{InterfaceKind, Operation};
use tracing::debug;

use crate::collaborator::{unsupported, Collaborator, ExternalCall, ExternalResponse, ExternalResult};

/// In-memory structured-config store.
pub struct MockConfigStore {
    docs: Mutex<HashMap<String, Value>>,
}

impl MockConfigStore {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
        }
    }

    /// Document returned for paths that were never written.
    pub fn default_config() -> Value {
        json!({
            "version": 1,
            "logLevel": "info",
            "retries": 3,
        })
    }
}

impl Default for MockConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Collaborator for MockConfigStore {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::ConfigStore
    }

    fn invoke(&self, call: &ExternalCall) -> ExternalResult {
        let path = call.str_param("path")?;
        match call.operation {
            Operation::Read => {
                let docs = self.docs.lock();
                let (config, exists) = match docs.get(path) {
                    Some(doc) => (doc.clone(), true),
                    None => (Self::default_config(), false),
                };
                debug!("config read: path={} exists={}", path, exists);
                Ok(ExternalResponse::sized(
                    json!({ "path": path, "config": config, "exists": exists }),
                    50,
                ))
            }
            Operation::Write => {
                let data = call
                    .params
                    .get("data")
                    .cloned()
                    .unwrap_or(Value::Null);
                let bytes = data.to_string().len();
                self.docs.lock().insert(path.to_string(), data);
                debug!("config write: path={} bytes={}", path, bytes);
                Ok(ExternalResponse::sized(
                    json!({ "path": path, "written": true, "bytes": bytes }),
                    50,
                ))
            }
            op => unsupported(self.kind(), op),
        }
    }
}
