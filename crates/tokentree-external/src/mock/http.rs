//! HTTP endpoint with canned routes.

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokentree_core::{InterfaceKind, Operation};
use tracing::debug;

use crate::collaborator::{
    unsupported, Collaborator, ExternalCall, ExternalFailure, ExternalResponse, ExternalResult,
};

/// Routes the mock answers, as `(method, path)`.
pub const ROUTES: [(&str, &str); 3] = [
    ("GET", "/health"),
    ("GET", "/status"),
    ("POST", "/echo"),
];

pub struct MockHttpEndpoint {
    sent: Mutex<Vec<u64>>,
}

impl MockHttpEndpoint {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Status codes passed to `respond`, in order.
    pub fn sent_statuses(&self) -> Vec<u64> {
        self.sent.lock().clone()
    }

    /// Path component of `url`, accepting absolute and relative forms.
    fn path_of(url: &str) -> &str {
        let without_scheme = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"));
        match without_scheme {
            Some(rest) => rest.find('/').map_or("/", |i| &rest[i..]),
            None => url,
        }
    }

    fn is_routed(method: &str, path: &str) -> bool {
        ROUTES
            .iter()
            .any(|(m, p)| m.eq_ignore_ascii_case(method) && *p == path)
    }
}

impl Default for MockHttpEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl Collaborator for MockHttpEndpoint {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::HttpEndpoint
    }

    fn invoke(&self, call: &ExternalCall) -> ExternalResult {
        match call.operation {
            Operation::Request => {
                let method = call.str_param("method")?.to_uppercase();
                let url = call.str_param("url")?;
                let path = Self::path_of(url);
                if !Self::is_routed(&method, path) {
                    return Err(ExternalFailure::new(format!("no route for {} {}", method, path)));
                }
                let body = match path {
                    "/health" => json!({ "status": "ok" }),
                    "/status" => json!({ "status": "ok", "uptime": 1 }),
                    _ => call.params.get("body").cloned().unwrap_or(Value::Null),
                };
                debug!("http request: {} {}", method, path);
                // Cost tracks the response body size.
                Ok(ExternalResponse::sized(
                    json!({ "status": 200, "method": method, "path": path, "body": body }),
                    20,
                ))
            }
            Operation::Respond => {
                let status = call.u64_param("status")?;
                if !(100..600).contains(&status) {
                    return Err(ExternalFailure::new(format!("invalid status {}", status)));
                }
                self.sent.lock().push(status);
                let body = call.params.get("body").cloned().unwrap_or(Value::Null);
                Ok(ExternalResponse::sized(
                    json!({ "status": status, "sent": true, "body": body }),
                    20,
                ))
            }
            Operation::Validate => {
                let url = call.str_param("url")?;
                let well_formed = url.starts_with('/')
                    || url.starts_with("http://")
                    || url.starts_with("https://");
                let path = Self::path_of(url);
                let routed = ROUTES.iter().any(|(_, p)| *p == path);
                Ok(ExternalResponse::sized(
                    json!({ "url": url, "valid": well_formed, "routed": routed }),
                    20,
                ))
            }
            op => unsupported(self.kind(), op),
        }
    }
}
