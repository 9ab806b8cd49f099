//! Closed set of dispatchable actions and the leaf targets each one needs.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokentree_core::{Error, InterfaceKind, Operation};

/// One leaf call an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Target {
    pub kind: InterfaceKind,
    pub operation: Operation,
}

macro_rules! t {
    ($kind:expr, $op:expr) => {
        Target {
            kind: $kind,
            operation: $op,
        }
    };
}

macro_rules! actions {
    ($($variant:ident => $name:literal,)+) => {
        /// Named request routed to one leaf, or to two leaves and aggregated.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum Action {
            $($variant,)+
        }

        impl Action {
            pub const ALL: &'static [Action] = &[$(Action::$variant,)+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Action::$variant => $name,)+
                }
            }
        }
    };
}

actions! {
    ReadConfig => "read_config",
    WriteConfig => "write_config",
    AppendLog => "append_log",
    ReadLog => "read_log",
    RotateLog => "rotate_log",
    ImportSheet => "import_sheet",
    ExportSheet => "export_sheet",
    ValidateSheet => "validate_sheet",
    QueryTenant => "query_tenant",
    InsertTenant => "insert_tenant",
    UpdateTenant => "update_tenant",
    DeleteTenant => "delete_tenant",
    CallTool => "call_tool",
    ListTools => "list_tools",
    ValidateTool => "validate_tool",
    GetResource => "get_resource",
    ListResources => "list_resources",
    RenderTemplate => "render_template",
    ApiRequest => "api_request",
    ApiRespond => "api_respond",
    ValidateEndpoint => "validate_endpoint",
    GeneratePdf => "generate_pdf",
    PdfTemplate => "pdf_template",
    ExportPdf => "export_pdf",
    InitSystem => "init_system",
    SyncData => "sync_data",
    InfrastructureStatus => "infrastructure_status",
    PromptedToolCall => "prompted_tool_call",
    MultiOutput => "multi_output",
}

impl Action {
    /// Leaf calls this action makes. Two targets means aggregation; both
    /// receive the same payload.
    pub fn targets(self) -> &'static [Target] {
        use InterfaceKind::*;
        use Operation as Op;
        match self {
            Self::ReadConfig => &[t!(ConfigStore, Op::Read)],
            Self::WriteConfig => &[t!(ConfigStore, Op::Write)],
            Self::AppendLog => &[t!(AppendLog, Op::Write)],
            Self::ReadLog => &[t!(AppendLog, Op::Read)],
            Self::RotateLog => &[t!(AppendLog, Op::Rotate)],
            Self::ImportSheet => &[t!(TabularStore, Op::Read)],
            Self::ExportSheet => &[t!(TabularStore, Op::Write)],
            Self::ValidateSheet => &[t!(TabularStore, Op::Validate)],
            Self::QueryTenant => &[t!(RelationalStore, Op::Query)],
            Self::InsertTenant => &[t!(RelationalStore, Op::Insert)],
            Self::UpdateTenant => &[t!(RelationalStore, Op::Update)],
            Self::DeleteTenant => &[t!(RelationalStore, Op::Delete)],
            Self::CallTool => &[t!(ToolApi, Op::Call)],
            Self::ListTools => &[t!(ToolApi, Op::List)],
            Self::ValidateTool => &[t!(ToolApi, Op::Validate)],
            Self::GetResource => &[t!(ResourceApi, Op::Get)],
            Self::ListResources => &[t!(ResourceApi, Op::List)],
            Self::RenderTemplate => &[t!(ResourceApi, Op::Template)],
            Self::ApiRequest => &[t!(HttpEndpoint, Op::Request)],
            Self::ApiRespond => &[t!(HttpEndpoint, Op::Respond)],
            Self::ValidateEndpoint => &[t!(HttpEndpoint, Op::Validate)],
            Self::GeneratePdf => &[t!(DocumentStore, Op::Generate)],
            Self::PdfTemplate => &[t!(DocumentStore, Op::Template)],
            Self::ExportPdf => &[t!(DocumentStore, Op::Export)],
            Self::InitSystem => &[t!(ConfigStore, Op::Read), t!(AppendLog, Op::Write)],
            Self::SyncData => &[t!(TabularStore, Op::Read), t!(RelationalStore, Op::Query)],
            Self::InfrastructureStatus => &[t!(ConfigStore, Op::Read), t!(RelationalStore, Op::Query)],
            Self::PromptedToolCall => &[t!(ResourceApi, Op::Template), t!(ToolApi, Op::Call)],
            Self::MultiOutput => &[t!(HttpEndpoint, Op::Request), t!(DocumentStore, Op::Generate)],
        }
    }

    pub fn is_aggregate(self) -> bool {
        self.targets().len() > 1
    }

    /// Payload fields filled in when the caller leaves them out.
    pub fn default_params(self) -> &'static [(&'static str, &'static str)] {
        let relational = self
            .targets()
            .iter()
            .any(|t| t.kind == InterfaceKind::RelationalStore);
        if relational {
            &[("table", "tenants")]
        } else {
            &[]
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| Error::Routing(format!("unknown action '{}'", s)))
    }
}
