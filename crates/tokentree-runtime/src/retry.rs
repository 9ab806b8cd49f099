//! Retry policy applied by the unit directly above a leaf.

use serde_json::json;
use tracing::{debug, warn};

use crate::types::UnitResult;

/// Re-attempt a leaf call on external failures, with no backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable code, or
    /// `max_retries` retries are spent.
    ///
    /// `attempt` receives the zero-based attempt number. Tokens from every
    /// attempt are summed. On success `data.retries` holds the number of
    /// retries it took; when every attempt fails `data.retries` is
    /// `max_retries` and `handler_id` is appended to the path.
    pub fn run<F>(&self, handler_id: &str, mut attempt: F) -> UnitResult
    where
        F: FnMut(u32) -> UnitResult,
    {
        let mut tokens = 0;
        let mut n = 0;
        loop {
            let mut result = attempt(n);
            tokens += result.tokens_used;
            result.tokens_used = tokens;

            if result.success {
                result.data.insert("retries".into(), json!(n));
                return result;
            }

            let retryable = result.error_code().is_some_and(|c| c.is_retryable());
            if !retryable {
                return result;
            }

            if n >= self.max_retries {
                warn!(
                    "{} gave up on {} after {} retries",
                    handler_id, result.unit_id, self.max_retries
                );
                result.data.insert("retries".into(), json!(self.max_retries));
                result.path.push(handler_id.to_string());
                return result;
            }

            n += 1;
            debug!("{} retrying {} ({}/{})", handler_id, result.unit_id, n, self.max_retries);
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(tokentree_core::config::DEFAULT_MAX_RETRIES)
    }
}
