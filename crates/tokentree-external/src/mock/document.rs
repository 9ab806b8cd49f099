//! Report document generation and export.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokentree_core::{document_pages, InterfaceKind, Operation};
use tracing::debug;

use crate::collaborator::{
    unsupported, Collaborator, ExternalCall, ExternalFailure, ExternalResponse, ExternalResult,
};

struct Document {
    report_type: String,
    pages: u64,
    generated_at: String,
}

#[derive(Default)]
struct DocInner {
    next_id: u64,
    docs: HashMap<String, Document>,
}

pub struct MockDocumentStore {
    inner: Mutex<DocInner>,
}

impl MockDocumentStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(DocInner::default()),
        }
    }

    fn sections(report_type: &str) -> Option<&'static [&'static str]> {
        match report_type {
            "summary" => Some(&["title", "overview", "totals"]),
            "utilization" => Some(&["title", "leaves", "chart", "notes"]),
            "inventory" => Some(&["title", "items", "reorder"]),
            _ => None,
        }
    }
}

impl Default for MockDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Collaborator for MockDocumentStore {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::DocumentStore
    }

    fn invoke(&self, call: &ExternalCall) -> ExternalResult {
        match call.operation {
            Operation::Generate => {
                let report_type = call.str_param("report_type")?;
                let pages = document_pages(&call.params)
                    .ok_or_else(|| ExternalFailure::new("pages must be a positive integer"))?;
                let generated_at = Utc::now().to_rfc3339();

                let mut inner = self.inner.lock();
                inner.next_id += 1;
                let id = format!("doc-{}", inner.next_id);
                inner.docs.insert(
                    id.clone(),
                    Document {
                        report_type: report_type.to_string(),
                        pages,
                        generated_at: generated_at.clone(),
                    },
                );
                debug!("document generated: id={} pages={}", id, pages);
                Ok(ExternalResponse::sized(
                    json!({
                        "documentId": id,
                        "reportType": report_type,
                        "pages": pages,
                        "generatedAt": generated_at,
                    }),
                    10,
                ))
            }
            Operation::Template => {
                let report_type = call.str_param("report_type")?;
                let sections = Self::sections(report_type).ok_or_else(|| {
                    ExternalFailure::new(format!("no template for report type '{}'", report_type))
                })?;
                Ok(ExternalResponse::sized(
                    json!({ "reportType": report_type, "sections": sections }),
                    10,
                ))
            }
            Operation::Export => {
                let id = call.str_param("document_id")?;
                let format = call
                    .params
                    .get("format")
                    .and_then(Value::as_str)
                    .unwrap_or("pdf");
                let inner = self.inner.lock();
                let doc = inner
                    .docs
                    .get(id)
                    .ok_or_else(|| ExternalFailure::new(format!("document '{}' not found", id)))?;
                Ok(ExternalResponse::sized(
                    json!({
                        "documentId": id,
                        "reportType": doc.report_type,
                        "format": format,
                        "pages": doc.pages,
                        "bytes": doc.pages.saturating_mul(2048),
                        "generatedAt": doc.generated_at,
                    }),
                    10,
                ))
            }
            op => unsupported(self.kind(), op),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(op: Operation, params: Value) -> ExternalCall {
        ExternalCall::new(op, params.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_page_count_follows_rows_or_explicit_pages() {
        let store = MockDocumentStore::new();
        let rows: Vec<Value> = (0..45).map(|i| json!({ "n": i })).collect();
        let resp = store
            .invoke(&call(Operation::Generate, json!({"report_type": "summary", "rows": rows})))
            .unwrap();
        assert_eq!(resp.data["pages"], json!(3));

        let resp = store
            .invoke(&call(Operation::Generate, json!({"report_type": "summary", "pages": 5})))
            .unwrap();
        assert_eq!(resp.data["pages"], json!(5));

        assert!(store
            .invoke(&call(Operation::Generate, json!({"report_type": "summary", "pages": 0})))
            .is_err());
    }

    #[test]
    fn test_generate_then_export() {
        let store = MockDocumentStore::new();
        let rows: Vec<Value> = (0..25).map(|i| json!({ "n": i })).collect();
        let resp = store
            .invoke(&call(
                Operation::Generate,
                json!({"report_type": "summary", "rows": rows}),
            ))
            .unwrap();
        assert_eq!(resp.data["pages"], json!(2));
        let id = resp.data["documentId"].as_str().unwrap().to_string();
        assert_eq!(id, "doc-1");

        let resp = store
            .invoke(&call(Operation::Export, json!({"document_id": id})))
            .unwrap();
        assert_eq!(resp.data["format"], json!("pdf"));
        assert_eq!(resp.data["bytes"], json!(4096));
    }

    #[test]
    fn test_export_unknown_fails() {
        let store = MockDocumentStore::new();
        assert!(store
            .invoke(&call(Operation::Export, json!({"document_id": "doc-9"})))
            .is_err());
    }

    #[test]
    fn test_template_sections() {
        let store = MockDocumentStore::new();
        let resp = store
            .invoke(&call(Operation::Template, json!({"report_type": "utilization"})))
            .unwrap();
        assert_eq!(resp.data["sections"].as_array().unwrap().len(), 4);
        assert!(store
            .invoke(&call(Operation::Template, json!({"report_type": "poem"})))
            .is_err());
    }
}
