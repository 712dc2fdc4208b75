//! Error taxonomy for the conductor pipeline.
//!
//! Stage-level failures never escape the facade as errors; they are folded
//! into a `failed` run. Only caller mistakes and faults that happen before a
//! run record exists are returned as `Err`.

use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while driving a conductor run
#[derive(Debug, Error)]
pub enum ConductorError {
    /// Bad caller input; rejected before the engine is involved
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The run store is unreachable or rejected a write
    #[error("Run store error: {0}")]
    Persistence(#[from] StoreError),

    /// A research, drafting or directory collaborator failed
    #[error("Provider error: {0}")]
    Provider(String),

    /// An impossible transition or missing upstream stage output
    #[error("Invalid pipeline state: {0}")]
    State(String),
}

impl ConductorError {
    /// Wrap a collaborator failure with a short description of the call
    pub fn provider(context: impl std::fmt::Display, err: anyhow::Error) -> Self {
        Self::Provider(format!("{}: {:#}", context, err))
    }

    /// Short machine-readable kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Persistence(_) => "persistence",
            Self::Provider(_) => "provider",
            Self::State(_) => "state",
        }
    }
}
