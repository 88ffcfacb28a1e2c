//! Error taxonomy for the query and ingestion boundary.
//!
//! Three failure classes matter to callers: bad input (rejected before any
//! write or query, never retried), provider outages (retried with backoff,
//! then surfaced), and storage failures. An empty result set is *not* an
//! error anywhere in this crate; operations label it explicitly instead.

use thiserror::Error;

/// Errors produced by the retrieval and orchestration layer.
#[derive(Debug, Error)]
pub enum WisdomError {
    /// Malformed transcript or invalid query parameters. Rejected up front.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The embedding or synthesis provider failed after bounded retries.
    /// Callers must surface this, never convert it to an empty result.
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Storage failure. Unexpected natural-key conflicts land here and are
    /// defects, not recoverable conditions.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl WisdomError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        WisdomError::InvalidInput(msg.into())
    }

    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        WisdomError::RetrievalUnavailable(err.to_string())
    }

    /// True for errors the caller could fix by changing the request.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, WisdomError::InvalidInput(_))
    }
}
