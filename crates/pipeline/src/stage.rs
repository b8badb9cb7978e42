use crate::runner::{Tool, ToolCommand, ToolError, ToolRunner};
use std::path::PathBuf;
use tracing::debug;
use tract_kit_common::ArtifactStore;

#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("Tool failure: {0}")]
    Tool(#[from] ToolError),
    #[error("Missing upstream artifact: {0}")]
    MissingInput(String),
    #[error("Stage body finished without producing {0}")]
    MissingOutput(String),
}

/// One step of a stage body. Argument lists are typed and fully resolved
/// at plan-construction time; the one composite step exists because the
/// divisor of the normalization is only known at run time.
#[derive(Debug, Clone)]
pub enum StageStep {
    Invoke(ToolCommand),
    /// Divide a volume by its own voxel-wise maximum, read back from the
    /// volume-statistics tool, producing a [0,1]-bounded map.
    NormalizeToMax { input: PathBuf, output: PathBuf },
}

/// Outcome of running a stage that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Every declared output already existed; zero tools were invoked.
    Skipped,
    Completed,
}

/// A named unit of work: declared upstream inputs, declared outputs, and
/// an ordered tool-invocation sequence. A stage is data; it is constructed
/// at plan time and evaluated once per run.
#[derive(Debug, Clone)]
pub struct Stage {
    name: String,
    inputs: Vec<PathBuf>,
    outputs: Vec<PathBuf>,
    steps: Vec<StageStep>,
}

impl Stage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Declare an artifact this stage reads but does not produce. Checked
    /// before the body runs so a missing upstream file is reported as a
    /// pipeline error rather than an opaque tool diagnostic.
    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    pub fn inputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.inputs.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Declare an artifact this stage produces. The idempotency predicate
    /// requires every declared output, not a single sentinel, so a stage
    /// that crashed half-way re-runs on resume.
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.outputs.push(path.into());
        self
    }

    pub fn outputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.outputs.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn step(mut self, step: StageStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn invoke(self, command: ToolCommand) -> Self {
        self.step(StageStep::Invoke(command))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_outputs(&self) -> &[PathBuf] {
        &self.outputs
    }

    pub fn steps(&self) -> &[StageStep] {
        &self.steps
    }

    /// True iff every declared output already exists in the store.
    pub fn is_done(&self, store: &ArtifactStore) -> bool {
        !self.outputs.is_empty() && self.outputs.iter().all(|path| store.exists(path))
    }

    /// Run the stage body unless it is already done. Aborts on the first
    /// failing step, leaving any partially written artifacts in place, then
    /// re-checks that every declared output now exists.
    pub fn run<R: ToolRunner>(
        &self,
        runner: &R,
        store: &ArtifactStore,
    ) -> Result<StageOutcome, StageError> {
        if self.is_done(store) {
            return Ok(StageOutcome::Skipped);
        }

        for input in &self.inputs {
            if !store.exists(input) {
                return Err(StageError::MissingInput(input.display().to_string()));
            }
        }

        for step in &self.steps {
            match step {
                StageStep::Invoke(command) => {
                    runner.invoke(command, store.root())?;
                }
                StageStep::NormalizeToMax { input, output } => {
                    normalize_to_max(runner, store, input, output)?;
                }
            }
        }

        for output in &self.outputs {
            if !store.exists(output) {
                return Err(StageError::MissingOutput(output.display().to_string()));
            }
        }

        Ok(StageOutcome::Completed)
    }
}

fn normalize_to_max<R: ToolRunner>(
    runner: &R,
    store: &ArtifactStore,
    input: &std::path::Path,
    output: &std::path::Path,
) -> Result<(), StageError> {
    let stats = ToolCommand::new(Tool::VolumeStats)
        .arg(input.display().to_string())
        .arg("-R");
    let range = runner.invoke(&stats, store.root())?;
    let max = parse_range_max(&range.stdout)?;
    debug!(input = %input.display(), max, "normalizing by voxel-wise maximum");

    let divide = ToolCommand::new(Tool::VoxelMath)
        .arg(input.display().to_string())
        .args(["-div", &max.to_string()])
        .arg(output.display().to_string());
    runner.invoke(&divide, store.root())?;
    Ok(())
}

/// Extract the maximum from the volume-statistics range output, which is
/// a whitespace-separated "min max" pair.
pub(crate) fn parse_range_max(stdout: &str) -> Result<f64, ToolError> {
    stdout
        .split_whitespace()
        .nth(1)
        .and_then(|token| token.parse::<f64>().ok())
        .ok_or_else(|| ToolError::UnparseableOutput {
            tool: Tool::VolumeStats.executable(),
            output: stdout.to_string(),
        })
}
