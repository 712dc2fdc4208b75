//! conductor - multi-agent content production pipeline
//!
//! Drives one practice through a fixed sequence of stages: a health check
//! of the practice, keyword research (scholar), concurrent drafting
//! (ghostwriter) and a final summary. Every run is persisted as a record
//! with checkpoints after each stage.
//!
//! # Architecture
//!
//! - Stage handlers compute outputs; only the engine moves between stages
//! - Every successful stage is checkpointed to the run store
//! - A run always ends `completed` or `failed`, never stuck `running`
//! - Interrupted runs can be resumed from their last checkpoint
//!
//! # Modules
//!
//! - `adapters`: External collaborators (directory, research, drafting, webhook)
//! - `core`: Engine, facade and settings
//! - `domain`: Data structures (Run, PipelineState, Topic)
//! - `stages`: The four stage handlers
//! - `store`: Run persistence (SQLite, in-memory)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the pipeline for a practice
//! conductor run --practice p-123 --organization org-9
//!
//! # Check run status
//! conductor status <run-id>
//!
//! # Resume an interrupted run
//! conductor resume <run-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod stages;
pub mod store;

// Re-export main types at crate root for convenience
pub use crate::core::{Conductor, ConductorResult, PipelineSettings, RunRequest};
pub use domain::{PipelineState, Run, RunStatus, Stage};
pub use error::ConductorError;
pub use stages::Providers;
pub use store::{MemoryRunStore, RunStore, SqliteRunStore, StoreError};
