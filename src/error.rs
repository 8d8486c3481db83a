//! Error taxonomy shared by the orchestrator, REST facade, and MCP bridge.
//!
//! Mirrors the kinds enumerated in the design doc's error-handling section:
//! transient failures are retried by the task queue, folder-wide failures
//! drive the state machine to `error`, and `InvariantViolation` is never
//! recoverable — a write that would violate a store invariant must fail
//! loudly rather than persist partial data.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HarnessError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("store corrupt: {0}")]
    StoreCorrupt(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("permanent task failure: {0}")]
    PermanentTaskFailure(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl HarnessError {
    /// Machine-readable kind, used in REST error bodies and MCP error data.
    pub fn kind(&self) -> &'static str {
        match self {
            HarnessError::NotFound(_) => "NotFound",
            HarnessError::SchemaMismatch(_) => "SchemaMismatch",
            HarnessError::StoreCorrupt(_) => "StoreCorrupt",
            HarnessError::Transient(_) => "Transient",
            HarnessError::PermanentTaskFailure(_) => "PermanentTaskFailure",
            HarnessError::ResourceExhausted(_) => "ResourceExhausted",
            HarnessError::Cancelled(_) => "Cancelled",
            HarnessError::ProtocolViolation(_) => "ProtocolViolation",
            HarnessError::InvariantViolation(_) => "InvariantViolation",
        }
    }

    /// Whether a caller should retry after backing off (vs. giving up).
    pub fn is_retriable(&self) -> bool {
        matches!(self, HarnessError::Transient(_))
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
