//! Error types for parley-analysis.

use thiserror::Error;

/// Result alias for analysis operations.
pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;

/// Errors that can occur in extraction and proposals.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The model's structured output failed to parse. Nothing was
    /// persisted; the conversation message itself is unaffected.
    #[error("malformed analysis output: {0}")]
    Malformed(String),

    /// The model call failed
    #[error("llm: {0}")]
    Llm(String),

    /// The model call exceeded its wall-clock budget
    #[error("llm call timed out")]
    LlmTimeout,

    /// Storage fault
    #[error("store: {0}")]
    Store(#[from] parley_store::StoreError),

    /// Proposal configuration rejected
    #[error("{0}")]
    Config(#[from] parley_types::ParleyError),
}
