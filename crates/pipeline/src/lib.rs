pub mod paths;
pub mod plan;
pub mod runner;
pub mod stage;
pub mod tracts;

use runner::{SystemRunner, ToolRunner};
use stage::{Stage, StageError, StageOutcome};
use thiserror::Error;
use tracing::{error, info};
use tract_kit_common::{ArtifactStore, ToolConfig};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageError,
    },
    #[error(transparent)]
    Common(#[from] tract_kit_common::TractKitError),
}

/// Tally of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub completed: usize,
    pub skipped: usize,
}

/// The pipeline driver: executes stages strictly in listed order, exactly
/// once per invocation, and halts the whole run on the first failure. A
/// stage body may assume every artifact of earlier stages exists.
pub struct Pipeline<R: ToolRunner> {
    runner: R,
    store: ArtifactStore,
}

impl<R: ToolRunner> Pipeline<R> {
    pub fn new(runner: R, store: ArtifactStore) -> Self {
        Self { runner, store }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn run(&self, stages: &[Stage]) -> Result<RunSummary, PipelineError> {
        self.store.ensure_layout(paths::LAYOUT)?;

        let mut summary = RunSummary::default();
        for stage in stages {
            info!(stage = stage.name(), "starting stage");
            match stage.run(&self.runner, &self.store) {
                Ok(StageOutcome::Skipped) => {
                    info!(stage = stage.name(), "skipped, outputs already present");
                    summary.skipped += 1;
                }
                Ok(StageOutcome::Completed) => {
                    info!(stage = stage.name(), "completed");
                    summary.completed += 1;
                }
                Err(source) => {
                    error!(stage = stage.name(), %source, "stage failed, aborting run");
                    return Err(PipelineError::Stage {
                        stage: stage.name().to_string(),
                        source,
                    });
                }
            }
        }
        Ok(summary)
    }
}

impl Pipeline<SystemRunner> {
    /// Driver over the real process-execution boundary.
    pub fn system(config: ToolConfig, store: ArtifactStore) -> Self {
        Self::new(SystemRunner::new(config), store)
    }
}
