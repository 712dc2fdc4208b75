//! Stage handlers.
//!
//! Each handler reads the slice of `PipelineState` produced by earlier
//! stages and returns its own output. Handlers never write to the run
//! store; the engine owns persistence and transitions.

pub mod finalize;
pub mod ghostwriter;
pub mod health_check;
pub mod scholar;

use std::sync::Arc;

use crate::adapters::{ContentDrafter, KeywordResearch, PracticeDirectory};
use crate::core::PipelineSettings;

pub use finalize::Finalize;
pub use ghostwriter::{DraftCollector, Ghostwriter};
pub use health_check::HealthCheck;
pub use scholar::Scholar;

/// External collaborators the stages depend on
#[derive(Clone)]
pub struct Providers {
    pub directory: Arc<dyn PracticeDirectory>,
    pub research: Arc<dyn KeywordResearch>,
    pub drafter: Arc<dyn ContentDrafter>,
}

/// The four handlers, configured from one set of settings
pub struct Stages {
    pub health_check: HealthCheck,
    pub scholar: Scholar,
    pub ghostwriter: Ghostwriter,
    pub finalize: Finalize,
}

impl Stages {
    pub fn new(providers: Providers, settings: &PipelineSettings) -> Self {
        Self {
            health_check: HealthCheck::new(providers.directory, settings),
            scholar: Scholar::new(providers.research, settings),
            ghostwriter: Ghostwriter::new(providers.drafter, settings),
            finalize: Finalize,
        }
    }
}
