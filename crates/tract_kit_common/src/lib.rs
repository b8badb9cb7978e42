//! # Tract Kit Common - Shared Types and Utilities
//!
//! Foundational types shared across the tract-kit workspace: the subject
//! identifier, the per-subject artifact store, and the configuration object
//! threaded into the external tool adapter.
//!
//! ## Example
//!
//! ```rust
//! use tract_kit_common::{ArtifactStore, Subject, ToolConfig};
//!
//! let subject = Subject::new("pat001").unwrap();
//! let store = ArtifactStore::new("/data/subjects", &subject);
//! assert!(store.path_of("roi/thalamus_left.nii.gz").ends_with(
//!     "pat001/roi/thalamus_left.nii.gz"
//! ));
//!
//! let config = ToolConfig { nthreads: Some(6), quiet: true };
//! assert_eq!(config.env_vars().len(), 3);
//! ```

use serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for tract kit operations
pub type Result<T> = std::result::Result<T, TractKitError>;

/// Standard error type for tract kit operations
#[derive(Error, Debug)]
pub enum TractKitError {
    #[error("Invalid subject identifier: {reason}")]
    InvalidSubject { reason: String },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A validated subject identifier, the root key of the per-subject
/// artifact namespace. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Subject(String);

impl Subject {
    /// Create a subject identifier. Rejects empty identifiers and
    /// identifiers containing path separators, which would break the
    /// store's addressing scheme.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(TractKitError::InvalidSubject {
                reason: "identifier is empty".to_string(),
            });
        }
        if id.contains(['/', '\\']) || id == "." || id == ".." {
            return Err(TractKitError::InvalidSubject {
                reason: format!("identifier '{}' contains path components", id),
            });
        }
        Ok(Self(id))
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Existence/addressing layer over the filesystem tree rooted at a
/// per-subject working directory. Stage bodies write into this namespace
/// through external tool invocations, never through the store itself.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(base_dir: impl AsRef<Path>, subject: &Subject) -> Self {
        Self {
            root: base_dir.as_ref().join(subject.id()),
        }
    }

    /// The subject's working directory; external tools run with this as
    /// their working directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of an artifact. A pure join: the same relative path
    /// always maps to the same absolute path within and across runs.
    pub fn path_of(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root.join(relative)
    }

    pub fn exists(&self, relative: impl AsRef<Path>) -> bool {
        self.path_of(relative).exists()
    }

    /// Create the artifact directories a run writes into. Tools refuse to
    /// write into directories that do not exist yet.
    pub fn ensure_layout(&self, subdirs: &[&str]) -> Result<()> {
        for dir in subdirs {
            std::fs::create_dir_all(self.root.join(dir))?;
        }
        Ok(())
    }
}

/// Explicit configuration for the external tool adapter, replacing the
/// ambient environment variables of older pipeline scripts. Constructed
/// once from the CLI flags and threaded into the adapter constructor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ToolConfig {
    /// Worker-count hint forwarded to the invoked tools. The orchestration
    /// layer treats this as an opaque performance parameter.
    pub nthreads: Option<usize>,
    /// Suppress the MRtrix tool family's console chatter.
    pub quiet: bool,
}

impl ToolConfig {
    /// Environment variables set on every tool invocation. The worker-count
    /// hint feeds both the MRtrix and the ITK/ANTs parallelism settings.
    pub fn env_vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = Vec::new();
        if let Some(n) = self.nthreads {
            vars.push(("MRTRIX_NTHREADS", n.to_string()));
            vars.push(("ITK_GLOBAL_DEFAULT_NUMBER_OF_THREADS", n.to_string()));
        }
        if self.quiet {
            vars.push(("MRTRIX_QUIET", "1".to_string()));
        }
        vars
    }
}
