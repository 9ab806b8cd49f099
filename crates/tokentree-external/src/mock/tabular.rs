//! Spreadsheet-style tabular store.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokentree_core::{InterfaceKind, Operation};
use tracing::debug;

use crate::collaborator::{
    unsupported, Collaborator, ExternalCall, ExternalFailure, ExternalResponse, ExternalResult,
};

/// Columns every row must carry to validate.
pub const REQUIRED_COLUMNS: [&str; 2] = ["name", "unit"];

pub struct MockTabularStore {
    sheets: Mutex<HashMap<String, Vec<Value>>>,
}

impl MockTabularStore {
    /// Store seeded with a small `inventory` sheet.
    pub fn new() -> Self {
        let mut sheets = HashMap::new();
        sheets.insert(
            "inventory".to_string(),
            vec![
                json!({"name": "widget", "unit": "pcs", "qty": 120}),
                json!({"name": "cable", "unit": "m", "qty": 45}),
                json!({"name": "solvent", "unit": "l", "qty": 8}),
            ],
        );
        Self {
            sheets: Mutex::new(sheets),
        }
    }

    fn validate_rows(rows: &[Value]) -> Vec<String> {
        let mut errors = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            let Some(obj) = row.as_object() else {
                errors.push(format!("row {}: not an object", i));
                continue;
            };
            for col in REQUIRED_COLUMNS {
                let present = obj
                    .get(col)
                    .and_then(Value::as_str)
                    .is_some_and(|s| !s.trim().is_empty());
                if !present {
                    errors.push(format!("row {}: missing '{}'", i, col));
                }
            }
        }
        errors
    }
}

impl Default for MockTabularStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Collaborator for MockTabularStore {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::TabularStore
    }

    fn invoke(&self, call: &ExternalCall) -> ExternalResult {
        match call.operation {
            Operation::Read => {
                let sheet = call.str_param("sheet")?;
                let sheets = self.sheets.lock();
                let rows = sheets
                    .get(sheet)
                    .ok_or_else(|| ExternalFailure::new(format!("sheet '{}' not found", sheet)))?;
                debug!("sheet read: sheet={} rows={}", sheet, rows.len());
                Ok(ExternalResponse::sized(
                    json!({ "sheet": sheet, "rows": rows, "rowCount": rows.len() }),
                    40,
                ))
            }
            Operation::Write => {
                let sheet = call.str_param("sheet")?;
                let rows = call.array_param("rows")?.clone();
                let count = rows.len();
                self.sheets.lock().insert(sheet.to_string(), rows);
                debug!("sheet write: sheet={} rows={}", sheet, count);
                Ok(ExternalResponse::sized(
                    json!({ "sheet": sheet, "rowsWritten": count }),
                    40,
                ))
            }
            Operation::Validate => {
                let rows = call.array_param("rows")?;
                let errors = Self::validate_rows(rows);
                Ok(ExternalResponse::sized(
                    json!({
                        "valid": errors.is_empty(),
                        "rowCount": rows.len(),
                        "errors": errors,
                    }),
                    40,
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
    fn test_read_seeded_sheet() {
        let store = MockTabularStore::new();
        let resp = store
            .invoke(&call(Operation::Read, json!({"sheet": "inventory"})))
            .unwrap();
        assert_eq!(resp.data["rowCount"], json!(3));
    }

    #[test]
    fn test_unknown_sheet_fails() {
        let store = MockTabularStore::new();
        let err = store
            .invoke(&call(Operation::Read, json!({"sheet": "nope"})))
            .unwrap_err();
        assert!(err.message.contains("nope"));
    }

    #[test]
    fn test_validate_required_columns() {
        let store = MockTabularStore::new();
        let resp = store
            .invoke(&call(
                Operation::Validate,
                json!({"rows": [{"name": "a", "unit": "kg"}, {"name": "b"}, 7]}),
            ))
            .unwrap();
        assert_eq!(resp.data["valid"], json!(false));
        assert_eq!(resp.data["errors"].as_array().unwrap().len(), 2);

        let resp = store
            .invoke(&call(Operation::Validate, json!({"rows": [{"name": "a", "unit": "kg"}]})))
            .unwrap();
        assert_eq!(resp.data["valid"], json!(true));
    }

    #[test]
    fn test_write_replaces_sheet() {
        let store = MockTabularStore::new();
        store
            .invoke(&call(
                Operation::Write,
                json!({"sheet": "orders", "rows": [{"name": "x", "unit": "pcs"}]}),
            ))
            .unwrap();
        let resp = store
            .invoke(&call(Operation::Read, json!({"sheet": "orders"})))
            .unwrap();
        assert_eq!(resp.data["rowCount"], json!(1));
    }
}
