//! TokenTree Core: errors, configuration, manifests, unit vocabulary.

pub mod config;
pub mod error;
pub mod manifest;
pub mod unit;

pub use config::RuntimeConfig;
pub use error::{Error, ErrorCode, Result};
pub use manifest::{Manifest, UnitConfig};
pub use unit::{document_pages, InterfaceKind, Operation, UnitKind, ROWS_PER_PAGE};
