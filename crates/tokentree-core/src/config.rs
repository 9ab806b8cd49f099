//! Runtime configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::manifest::Manifest;

pub const DEFAULT_TOTAL_BUDGET: u64 = 100_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_HISTORY_LIMIT: usize = 256;
pub const DEFAULT_PORT: u16 = 3010;

/// Top-level TokenTree configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Budget handed to the root on initialization.
    #[serde(default = "default_total_budget")]
    pub total_budget: u64,
    /// Retries a handler performs after the first failed leaf attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Dispatch records kept in memory.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// HTTP server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// JSON manifest; the standard 15-unit tree when absent.
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,
}

fn default_total_budget() -> u64 {
    DEFAULT_TOTAL_BUDGET
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}
fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            total_budget: DEFAULT_TOTAL_BUDGET,
            max_retries: DEFAULT_MAX_RETRIES,
            history_limit: DEFAULT_HISTORY_LIMIT,
            port: DEFAULT_PORT,
            manifest_path: None,
        }
    }
}

impl RuntimeConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(budget) = env_parse::<u64>("TOKENTREE_BUDGET")? {
            config.total_budget = budget;
        }
        if let Some(retries) = env_parse::<u32>("TOKENTREE_MAX_RETRIES")? {
            config.max_retries = retries;
        }
        if let Some(limit) = env_parse::<usize>("TOKENTREE_HISTORY_LIMIT")? {
            config.history_limit = limit;
        }
        if let Some(port) = env_parse::<u16>("PORT")? {
            config.port = port;
        }
        config.manifest_path = std::env::var("TOKENTREE_MANIFEST").ok().map(PathBuf::from);

        Ok(config)
    }

    /// Resolve the manifest this configuration points at.
    pub fn manifest(&self) -> Result<Manifest> {
        match &self.manifest_path {
            Some(path) => Manifest::load(path),
            None => Ok(Manifest::standard()),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} is not a valid value: {:?}", key, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.total_budget, 100_000);
        assert_eq!(config.max_retries, 3);
        assert!(config.manifest_path.is_none());
        assert_eq!(config.manifest().unwrap().units.len(), 15);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: RuntimeConfig = serde_json::from_str(r#"{"total_budget": 500}"#).unwrap();
        assert_eq!(config.total_budget, 500);
        assert_eq!(config.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn test_manifest_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.json");
        std::fs::write(&path, serde_json::to_string(&Manifest::complete(2)).unwrap()).unwrap();

        let config = RuntimeConfig {
            manifest_path: Some(path),
            ..Default::default()
        };
        assert_eq!(config.manifest().unwrap().units.len(), 7);
    }
}
