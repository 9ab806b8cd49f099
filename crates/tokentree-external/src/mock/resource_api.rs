//! URI-addressed resources and prompt templates.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokentree_core::{InterfaceKind, Operation};
use tracing::debug;

use crate::collaborator::{
    unsupported, Collaborator, ExternalCall, ExternalFailure, ExternalResponse, ExternalResult,
};

struct Resource {
    content: String,
    hits: u64,
}

pub struct MockResourceApi {
    resources: Mutex<BTreeMap<String, Resource>>,
}

impl MockResourceApi {
    pub fn new() -> Self {
        let seed = [
            ("docs://readme", "Token budgets flow from the root to the leaves."),
            ("docs://policy", "Leaves never spend beyond their allocation."),
            ("prompt://summarize", "Summarize {topic} for {audience}."),
        ];
        let resources = seed
            .into_iter()
            .map(|(uri, content)| {
                (
                    uri.to_string(),
                    Resource {
                        content: content.to_string(),
                        hits: 0,
                    },
                )
            })
            .collect();
        Self {
            resources: Mutex::new(resources),
        }
    }

    /// Replace every `{name}` with `vars[name]`, collecting names left unbound.
    pub fn render(template: &str, vars: &Map<String, Value>) -> (String, Vec<String>) {
        let mut out = String::with_capacity(template.len());
        let mut missing = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let Some(close) = after.find('}') else {
                out.push_str(&rest[open..]);
                rest = "";
                break;
            };
            let name = &after[..close];
            match vars.get(name) {
                Some(Value::String(s)) => out.push_str(s),
                Some(other) => out.push_str(&other.to_string()),
                None => {
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                    missing.push(name.to_string());
                }
            }
            rest = &after[close + 1..];
        }
        out.push_str(rest);
        (out, missing)
    }
}

impl Default for MockResourceApi {
    fn default() -> Self {
        Self::new()
    }
}

impl Collaborator for MockResourceApi {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::ResourceApi
    }

    fn invoke(&self, call: &ExternalCall) -> ExternalResult {
        match call.operation {
            Operation::Get => {
                let uri = call.str_param("uri")?;
                let mut resources = self.resources.lock();
                let res = resources
                    .get_mut(uri)
                    .ok_or_else(|| ExternalFailure::new(format!("resource '{}' not found", uri)))?;
                res.hits += 1;
                debug!("resource get: uri={} hits={}", uri, res.hits);
                Ok(ExternalResponse::sized(
                    json!({
                        "uri": uri,
                        "content": res.content,
                        "hits": res.hits,
                        "cached": res.hits > 1,
                    }),
                    30,
                ))
            }
            Operation::List => {
                let uris: Vec<String> = self.resources.lock().keys().cloned().collect();
                Ok(ExternalResponse::sized(json!({ "uris": uris }), 30))
            }
            Operation::Template => {
                let template = call.str_param("template")?;
                // A template naming a stored resource renders that resource's content.
                let source = self
                    .resources
                    .lock()
                    .get(template)
                    .map(|r| r.content.clone())
                    .unwrap_or_else(|| template.to_string());
                let empty = Map::new();
                let vars = call
                    .params
                    .get("variables")
                    .and_then(Value::as_object)
                    .unwrap_or(&empty);
                let (rendered, missing) = Self::render(&source, vars);
                Ok(ExternalResponse::sized(
                    json!({ "rendered": rendered, "missing": missing }),
                    30,
                ))
            }
            op => unsupported(self.kind(), op),
        }
    }
}
