//! Core orchestration logic.
//!
//! This module contains:
//! - PipelineSettings: Tunables shared by the stage handlers
//! - PipelineEngine: Stage state machine with checkpointing
//! - Conductor: Caller-facing facade

pub mod conductor;
pub mod engine;
pub mod settings;

// Re-export commonly used types
pub use conductor::{Conductor, ConductorResult, RunRequest};
pub use engine::PipelineEngine;
pub use settings::PipelineSettings;
