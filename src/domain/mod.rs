//! Domain types for the conductor pipeline.
//!
//! This module contains the core data structures:
//! - Run: Persisted record of one pipeline execution
//! - State: Stage machine and the working state threaded through it
//! - Topic: Research output and per-topic drafting outcomes

pub mod practice;
pub mod run;
pub mod state;
pub mod topic;

// Re-export commonly used types
pub use practice::PracticeProfile;
pub use run::{Checkpoint, NewRun, Run, RunStatus, Trigger, AGENT_NAME};
pub use state::{Freshness, HealthReport, PipelineState, RunSummary, Snapshot, Stage};
pub use topic::{DraftResult, Topic};
