//! Line-buffered append log with rotation.

use parking_lot::Mutex;
use serde_json::json;
use tokentree_core::{InterfaceKind, Operation};
use tracing::debug;

use crate::collaborator::{unsupported, Collaborator, ExternalCall, ExternalResponse, ExternalResult};

pub struct MockAppendLog {
    inner: Mutex<LogInner>,
}

#[derive(Default)]
struct LogInner {
    lines: Vec<String>,
    archives: Vec<Vec<String>>,
}

impl MockAppendLog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LogInner::default()),
        }
    }

    /// Lines currently in the live buffer.
    pub fn lines(&self) -> Vec<String> {
        self.inner.lock().lines.clone()
    }

    pub fn archive_count(&self) -> usize {
        self.inner.lock().archives.len()
    }
}

impl Default for MockAppendLog {
    fn default() -> Self {
        Self::new()
    }
}

impl Collaborator for MockAppendLog {
    fn kind(&self) -> InterfaceKind {
        InterfaceKind::AppendLog
    }

    fn invoke(&self, call: &ExternalCall) -> ExternalResult {
        match call.operation {
            Operation::Write => {
                let message = call.str_param("message")?;
                let level = call
                    .params
                    .get("level")
                    .and_then(|v| v.as_str())
                    .unwrap_or("info")
                    .to_uppercase();
                let line = format!("[{}] {}", level, message);
                let mut inner = self.inner.lock();
                inner.lines.push(line.clone());
                let line_number = inner.lines.len();
                debug!("log append: line={}", line_number);
                Ok(ExternalResponse::sized(
                    json!({ "line": line, "lineNumber": line_number }),
                    100,
                ))
            }
            Operation::Read => {
                let inner = self.inner.lock();
                let limit = call.opt_u64("limit").map(|n| n as usize);
                let start = limit
                    .map(|n| inner.lines.len().saturating_sub(n))
                    .unwrap_or(0);
                let lines = &inner.lines[start..];
                Ok(ExternalResponse::sized(
                    json!({ "lines": lines, "count": lines.len() }),
                    100,
                ))
            }
            Operation::Rotate => {
                let mut inner = self.inner.lock();
                let archived = std::mem::take(&mut inner.lines);
                let count = archived.len();
                inner.archives.push(archived);
                let archive_id = format!("archive-{}", inner.archives.len());
                debug!("log rotate: archived={} id={}", count, archive_id);
                Ok(ExternalResponse::sized(
                    json!({ "archived": count, "archiveId": archive_id }),
                    100,
                ))
            }
            op => unsupported(self.kind(), op),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn call(op: Operation, params: Value) -> ExternalCall {
        ExternalCall::new(op, params.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_write_formats_level() {
        let log = MockAppendLog::new();
        let resp = log
            .invoke(&call(Operation::Write, json!({"message": "boot", "level": "warn"})))
            .unwrap();
        assert_eq!(resp.data["line"], json!("[WARN] boot"));
        log.invoke(&call(Operation::Write, json!({"message": "ready"})))
            .unwrap();
        assert_eq!(log.lines(), vec!["[WARN] boot", "[INFO] ready"]);
    }

    #[test]
    fn test_read_limit() {
        let log = MockAppendLog::new();
        for i in 0..5 {
            log.invoke(&call(Operation::Write, json!({"message": format!("m{}", i)})))
                .unwrap();
        }
        let resp = log
            .invoke(&call(Operation::Read, json!({"limit": 2})))
            .unwrap();
        assert_eq!(resp.data["lines"], json!(["[INFO] m3", "[INFO] m4"]));
    }

    #[test]
    fn test_rotate_archives_and_clears() {
        let log = MockAppendLog::new();
        log.invoke(&call(Operation::Write, json!({"message": "a"})))
            .unwrap();
        let resp = log.invoke(&call(Operation::Rotate, json!({}))).unwrap();
        assert_eq!(resp.data["archived"], json!(1));
        assert_eq!(resp.data["archiveId"], json!("archive-1"));
        assert!(log.lines().is_empty());
        assert_eq!(log.archive_count(), 1);
    }

    #[test]
    fn test_unsupported_operation() {
        let log = MockAppendLog::new();
        assert!(log.invoke(&call(Operation::Query, json!({}))).is_err());
    }
}
