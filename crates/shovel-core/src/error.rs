//! The two-member fatal/retryable error taxonomy every shovel is built on.
//!
//! Every subsystem (warehouse, chain, schema) defines its own leaf error
//! type and converts into one of these two outward-facing variants at the
//! point where retryability is actually decided. Nothing upstream of that
//! boundary needs to know which leaf error occurred.

use thiserror::Error;

/// The only two failure modes a shovel runtime distinguishes.
#[derive(Debug, Error)]
pub enum ShovelError {
    /// Transient I/O failure against the warehouse or the chain. The
    /// runtime retries a bounded number of times, reconnecting before
    /// each attempt, before escalating to `Processing`.
    #[error("database connection error: {0}")]
    Database(String),

    /// Anything else. Fatal: the process exits non-zero and the
    /// orchestrator is expected to restart it.
    #[error("shovel processing error: {0}")]
    Processing(String),
}

impl ShovelError {
    pub fn database(msg: impl Into<String>) -> Self {
        ShovelError::Database(msg.into())
    }

    pub fn processing(msg: impl Into<String>) -> Self {
        ShovelError::Processing(msg.into())
    }

    /// `true` for `Database`, which the runtime retries; `false` for
    /// `Processing`, which is always fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ShovelError::Database(_))
    }
}

impl From<serde_json::Error> for ShovelError {
    fn from(e: serde_json::Error) -> Self {
        ShovelError::Processing(format!("serialization error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_is_retryable() {
        assert!(ShovelError::database("timeout").is_retryable());
        assert!(!ShovelError::processing("bad schema").is_retryable());
    }
}
