//! Error types for artifex.

use thiserror::Error;

use crate::model::JobStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// The pre-flight estimate (or the post-call correction) would push the
    /// ledger past the job's token budget. Fatal to the job — retrying the
    /// same content would re-exceed it.
    #[error(
        "token budget exceeded in {phase}: need ~{estimated} tokens, {remaining} of {budget} left"
    )]
    BudgetExceeded {
        phase: String,
        estimated: u32,
        remaining: u32,
        budget: u32,
    },

    #[error("{phase} phase timed out after {secs}s")]
    PhaseTimeout { phase: String, secs: u64 },

    #[error("provider error: {0}")]
    Provider(String),

    /// Model output that cannot be parsed into the expected shape.
    #[error("unusable model output: {0}")]
    BadArtifact(String),

    #[error("validation failed after {attempts} repair attempt(s): {}", .violations.join("; "))]
    ValidationFailed {
        attempts: u32,
        violations: Vec<String>,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
