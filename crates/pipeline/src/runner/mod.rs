use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use tracing::debug;
use tract_kit_common::ToolConfig;

#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("Failed to launch {tool}: {source}")]
    Launch {
        tool: &'static str,
        source: std::io::Error,
    },
    #[error("{tool} exited with code {code}: {stderr}")]
    Failed {
        tool: &'static str,
        code: i32,
        stderr: String,
    },
    #[error("Unparseable output from {tool}: {output}")]
    UnparseableOutput {
        tool: &'static str,
        output: String,
    },
}

/// The external image-processing executables the pipeline drives. The
/// orchestrator knows their CLI contracts, never their algorithms.
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, IntoStaticStr,
    PartialEq, Eq, Hash
)]
pub enum Tool {
    /// Label volume -> five-tissue-type segmentation
    #[strum(serialize = "5ttgen")]
    #[serde(rename = "5ttgen")]
    TissueSegment,
    /// 5tt segmentation -> gray/white-matter interface
    #[strum(serialize = "5tt2gmwmi")]
    #[serde(rename = "5tt2gmwmi")]
    InterfaceExtract,
    /// Image + template grid -> resampled image
    #[strum(serialize = "mrgrid")]
    #[serde(rename = "mrgrid")]
    GridResample,
    /// Voxel-wise arithmetic, thresholding and masking
    #[strum(serialize = "fslmaths")]
    #[serde(rename = "fslmaths")]
    VoxelMath,
    /// Image -> scalar summary (e.g. intensity range)
    #[strum(serialize = "fslstats")]
    #[serde(rename = "fslstats")]
    VolumeStats,
    /// Fiber field + seed/include/exclude masks -> streamline set
    #[strum(serialize = "tckgen")]
    #[serde(rename = "tckgen")]
    Tractography,
    /// Streamline set -> streamline density volume
    #[strum(serialize = "tckmap")]
    #[serde(rename = "tckmap")]
    Densify,
    /// Image + transform -> image in the target space
    #[strum(serialize = "antsApplyTransforms")]
    #[serde(rename = "antsApplyTransforms")]
    ApplyTransform,
}

impl Tool {
    pub fn executable(&self) -> &'static str {
        (*self).into()
    }
}

/// A fully resolved tool invocation: the executable and its ordered
/// argument list. No templating happens past this point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ToolCommand {
    pub tool: Tool,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Captured result of a successful tool invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// The process-execution boundary. A runner launches a named external tool
/// with a fixed argument list, blocks until it exits, and surfaces any
/// non-zero exit as a failure. It does not retry, interpret, or suppress.
pub trait ToolRunner {
    fn invoke(&self, command: &ToolCommand, working_dir: &Path) -> Result<ToolOutput, ToolError>;
}

/// Runner backed by `std::process::Command`. The tool configuration is
/// materialized as per-invocation environment, never process-wide state.
pub struct SystemRunner {
    config: ToolConfig,
}

impl SystemRunner {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToolConfig {
        &self.config
    }
}

impl ToolRunner for SystemRunner {
    fn invoke(&self, command: &ToolCommand, working_dir: &Path) -> Result<ToolOutput, ToolError> {
        let tool = command.tool.executable();
        debug!(tool, args = ?command.args, "invoking tool");

        let mut cmd = Command::new(tool);
        cmd.args(&command.args).current_dir(working_dir);
        for (key, value) in self.config.env_vars() {
            cmd.env(key, value);
        }

        let output = cmd
            .output()
            .map_err(|source| ToolError::Launch { tool, source })?;

        if !output.status.success() {
            return Err(ToolError::Failed {
                tool,
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(ToolOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
