//! In-memory relational tables addressed by structured parameters.
//!
//! Queries are equality filters over a JSON `filter` object. No SQL text is
//! ever accepted, so there is nothing to inject into.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokentree_core::{InterfaceKind, Operation};
use tracing::debug;

use crate::collaborator::{
    unsupported, Collaborator, ExternalCall, ExternalFailure, ExternalResponse, ExternalResult,
};

type Row = Map<String, Value>;

#[derive(Default)]
struct Table {
    next_id: u64,
    rows: Vec<Row>,
}

impl Table {
    fn insert(&mut self, mut record: Row) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        record.insert("id".into(), json!(id));
        self.rows.push(record);
        id
    }

    fn position(&self, id: u64) -> Option<usize> {
        self.rows
            .iter()
            .position(|r| r.get("id").and_then(Value::as_u64) == Some(id))
    }
}

pub struct MockRelationalStore {
    tables: Mutex<HashMap<String, Table>>,
}

impl MockRelationalStore {
    /// Store with a `tenants` table holding two rows.
    pub fn new() -> Self {
        let mut tenants = Table::default();
        for (name, plan) in [("Acme", "pro"), ("Globex", "basic")] {
            let mut row = Row::new();
            row.insert("name".into(), json!(name));
            row.insert("plan".into(), json!(plan));
            tenants.insert(row);
        }
        let mut tables = HashMap::new();
        tables.insert("tenants".to_string(), tenants);
        Self {
            tables: Mutex::new(tables),
        }
    }

    fn matches(row: &Row, filter: Option<&Map<String, Value>>) -> bool {
        filter.map_or(true, |f| f.iter().all(|(k, v)| row.get(k) == Some(v)))
    }
}

impl Default for MockRelationalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Collaborator for MockRelationalStore {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::RelationalStore
    }

    fn invoke(&self, call: &ExternalCall) -> ExternalResult {
        let table_name = call.str_param("table")?;
        let mut tables = self.tables.lock();

        let data = match call.operation {
            Operation::Query => {
                let table = tables
                    .get(table_name)
                    .ok_or_else(|| ExternalFailure::new(format!("table '{}' not found", table_name)))?;
                let filter = call.params.get("filter").and_then(Value::as_object);
                let rows: Vec<&Row> = table
                    .rows
                    .iter()
                    .filter(|r| Self::matches(r, filter))
                    .collect();
                debug!("query: table={} matched={}", table_name, rows.len());
                json!({ "table": table_name, "rows": rows, "count": rows.len() })
            }
            Operation::Insert => {
                let record = call.object_param("record")?.clone();
                let id = tables.entry(table_name.to_string()).or_default().insert(record);
                debug!("insert: table={} id={}", table_name, id);
                json!({ "table": table_name, "id": id, "inserted": true })
            }
            Operation::Update => {
                let id = call.u64_param("id")?;
                let fields = call.object_param("fields")?;
                let table = tables
                    .get_mut(table_name)
                    .ok_or_else(|| ExternalFailure::new(format!("table '{}' not found", table_name)))?;
                let updated = match table.position(id) {
                    Some(pos) => {
                        let row = &mut table.rows[pos];
                        for (k, v) in fields.iter().filter(|(k, _)| k.as_str() != "id") {
                            row.insert(k.clone(), v.clone());
                        }
                        true
                    }
                    None => false,
                };
                json!({ "table": table_name, "id": id, "updated": updated })
            }
            Operation::Delete => {
                let id = call.u64_param("id")?;
                let table = tables
                    .get_mut(table_name)
                    .ok_or_else(|| ExternalFailure::new(format!("table '{}' not found", table_name)))?;
                let deleted = match table.position(id) {
                    Some(pos) => {
                        table.rows.remove(pos);
                        true
                    }
                    None => false,
                };
                json!({ "table": table_name, "id": id, "deleted": deleted })
            }
            op => return unsupported(self.kind(), op),
        };
        Ok(ExternalResponse::sized(data, 40))
    }
}
