//! Unit vocabulary shared by every crate: unit kinds, leaf interface kinds
//! and the operations each interface supports.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Position-derived role of a unit in the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// Level 0, entry point for every request.
    Root,
    /// Internal coordination level between the root and the handlers.
    Manager,
    /// Parent of two leaves; owns the retry policy for them.
    Handler,
    /// The only kind allowed to call an external collaborator.
    LeafInterface,
}

impl UnitKind {
    /// Derive a kind from a unit's level in a tree whose leaves sit at `depth`.
    pub fn for_level(level: usize, depth: usize) -> Self {
        if level == 0 {
            Self::Root
        } else if level == depth {
            Self::LeafInterface
        } else if level + 1 == depth {
            Self::Handler
        } else {
            Self::Manager
        }
    }

    pub fn is_leaf(self) -> bool {
        matches!(self, Self::LeafInterface)
    }

    /// Fixed per-call overhead charged by an internal unit when none is configured.
    pub fn default_overhead(self) -> u64 {
        match self {
            Self::Root => 30,
            Self::Manager => 20,
            Self::Handler => 10,
            Self::LeafInterface => 0,
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Manager => write!(f, "manager"),
            Self::Handler => write!(f, "handler"),
            Self::LeafInterface => write!(f, "leaf_interface"),
        }
    }
}

/// Operation name sent across the collaborator boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
    Rotate,
    Validate,
    Query,
    Insert,
    Update,
    Delete,
    Call,
    List,
    Get,
    Template,
    Request,
    Respond,
    Generate,
    Export,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Rotate => "rotate",
            Self::Validate => "validate",
            Self::Query => "query",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Call => "call",
            Self::List => "list",
            Self::Get => "get",
            Self::Template => "template",
            Self::Request => "request",
            Self::Respond => "respond",
            Self::Generate => "generate",
            Self::Export => "export",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of external system a leaf unit talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    /// Path-scoped structured configuration documents.
    ConfigStore,
    /// Append-only, line-oriented log.
    AppendLog,
    /// Row-oriented spreadsheet-like files.
    TabularStore,
    /// Parameterized relational tables.
    RelationalStore,
    /// Remote tool invocation, variable cost.
    ToolApi,
    /// Cacheable resource fetches and templates.
    ResourceApi,
    /// Request/response HTTP endpoint.
    HttpEndpoint,
    /// Document generation, cost sized by page count.
    DocumentStore,
}

impl InterfaceKind {
    pub const ALL: [InterfaceKind; 8] = [
        Self::ConfigStore,
        Self::AppendLog,
        Self::TabularStore,
        Self::RelationalStore,
        Self::ToolApi,
        Self::ResourceApi,
        Self::HttpEndpoint,
        Self::DocumentStore,
    ];

    /// Operations this interface accepts.
    pub fn operations(self) -> &'static [Operation] {
        use Operation::*;
        match self {
            Self::ConfigStore => &[Read, Write],
            Self::AppendLog => &[Write, Read, Rotate],
            Self::TabularStore => &[Read, Write, Validate],
            Self::RelationalStore => &[Query, Insert, Update, Delete],
            Self::ToolApi => &[Call, List, Validate],
            Self::ResourceApi => &[Get, List, Template],
            Self::HttpEndpoint => &[Request, Respond, Validate],
            Self::DocumentStore => &[Generate, Template, Export],
        }
    }

    pub fn supports(self, op: Operation) -> bool {
        self.operations().contains(&op)
    }

    /// Payload fields that must be present for `op`.
    pub fn required_params(self, op: Operation) -> &'static [&'static str] {
        use Operation::*;
        match (self, op) {
            (Self::ConfigStore, Read) => &["path"],
            (Self::ConfigStore, Write) => &["path", "data"],
            (Self::AppendLog, Write) => &["message"],
            (Self::TabularStore, Read) => &["sheet"],
            (Self::TabularStore, Write) => &["sheet", "rows"],
            (Self::TabularStore, Validate) => &["rows"],
            (Self::RelationalStore, Query) => &["table"],
            (Self::RelationalStore, Insert) => &["table", "record"],
            (Self::RelationalStore, Update) => &["table", "id", "fields"],
            (Self::RelationalStore, Delete) => &["table", "id"],
            (Self::ToolApi, Call) | (Self::ToolApi, Validate) => &["tool"],
            (Self::ResourceApi, Get) => &["uri"],
            (Self::ResourceApi, Template) => &["template"],
            (Self::HttpEndpoint, Request) => &["method", "url"],
            (Self::HttpEndpoint, Respond) => &["status"],
            (Self::HttpEndpoint, Validate) => &["url"],
            (Self::DocumentStore, Generate) | (Self::DocumentStore, Template) => &["report_type"],
            (Self::DocumentStore, Export) => &["document_id"],
            _ => &[],
        }
    }

    /// Base token cost of a single call before payload sizing.
    pub fn base_cost(self) -> u64 {
        match self {
            Self::ConfigStore => 10,
            Self::AppendLog => 5,
            Self::TabularStore => 15,
            Self::RelationalStore => 20,
            Self::ToolApi => 50,
            Self::ResourceApi => 30,
            Self::HttpEndpoint => 25,
            Self::DocumentStore => 40,
        }
    }
}

/// Rows that fit on one generated page.
pub const ROWS_PER_PAGE: u64 = 20;

/// Pages a document-generation call produces: the explicit `pages` count if
/// given, otherwise one page plus one more per `ROWS_PER_PAGE` rows.
///
/// Returns `None` when `pages` is present but not a positive integer.
pub fn document_pages(params: &Map<String, Value>) -> Option<u64> {
    match params.get("pages") {
        Some(pages) => pages.as_u64().filter(|&p| p >= 1),
        None => {
            let rows = params.get("rows").and_then(Value::as_array).map_or(0, Vec::len) as u64;
            Some(1 + rows / ROWS_PER_PAGE)
        }
    }
}

impl std::fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ConfigStore => "config_store",
            Self::AppendLog => "append_log",
            Self::TabularStore => "tabular_store",
            Self::RelationalStore => "relational_store",
            Self::ToolApi => "tool_api",
            Self::ResourceApi => "resource_api",
            Self::HttpEndpoint => "http_endpoint",
            Self::DocumentStore => "document_store",
        };
        f.write_str(s)
    }
}
