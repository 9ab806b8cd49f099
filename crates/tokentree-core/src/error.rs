//! Error types for TokenTree.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed topology: {0}")]
    MalformedTopology(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("External I/O error: {0}")]
    ExternalIo(String),

    #[error("Budget exhausted on {unit}: requested {requested}, remaining {remaining}")]
    BudgetExhausted {
        unit: String,
        requested: u64,
        remaining: u64,
    },

    #[error("Routing error: {0}")]
    Routing(String),

    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    #[error("Unit {0} is not a leaf")]
    NotALeaf(String),

    #[error("Invalid weight for {unit}: {weight}")]
    InvalidWeight { unit: String, weight: u64 },

    #[error("Rebalance would leave {unit} with {allocated} tokens but {consumed} already consumed")]
    AllocationBelowConsumption {
        unit: String,
        allocated: u64,
        consumed: u64,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Structured code carried by every user-visible failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MalformedTopology,
    ValidationError,
    #[serde(rename = "external_io_error")]
    ExternalIoError,
    BudgetExhausted,
    RoutingError,
    /// A unit id that is not part of the hierarchy.
    NotFound,
    Internal,
}

impl ErrorCode {
    /// Generic message returned to callers. Detail stays in the logs.
    pub fn public_message(self) -> &'static str {
        match self {
            Self::MalformedTopology => "unit hierarchy is malformed",
            Self::ValidationError => "request failed validation",
            Self::ExternalIoError => "external service unavailable",
            Self::BudgetExhausted => "token budget exhausted",
            Self::RoutingError => "no route for action",
            Self::NotFound => "unit not found",
            Self::Internal => "internal error",
        }
    }

    /// Whether a retry policy may re-attempt a call that failed with this code.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::ExternalIoError)
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MalformedTopology => "malformed_topology",
            Self::ValidationError => "validation_error",
            Self::ExternalIoError => "external_io_error",
            Self::BudgetExhausted => "budget_exhausted",
            Self::RoutingError => "routing_error",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedTopology(_) => ErrorCode::MalformedTopology,
            Self::Validation(_) | Self::InvalidWeight { .. } => ErrorCode::ValidationError,
            Self::ExternalIo(_) => ErrorCode::ExternalIoError,
            Self::BudgetExhausted { .. } => ErrorCode::BudgetExhausted,
            Self::Routing(_) => ErrorCode::RoutingError,
            Self::UnknownUnit(_) => ErrorCode::NotFound,
            Self::NotALeaf(_)
            | Self::AllocationBelowConsumption { .. }
            | Self::Config(_)
            | Self::Io(_)
            | Self::Json(_) => ErrorCode::Internal,
        }
    }
}
