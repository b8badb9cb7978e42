use pipeline::tracts::{default_tracts, TractDefinition};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TractSetError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error("Tract '{0}' declares no seed ROIs; the first seed must be the thalamic mask")]
    MissingSeeds(String),
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

/// One tract entry in a user-supplied tract set.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TractEntry {
    pub name: String,
    /// Ordered seed/inclusion ROI identifiers, thalamic ROI first.
    pub seeds: Vec<String>,
    pub exclude: Option<String>,
    pub description: Option<String>,
}

/// A loadable tract-set configuration overriding the built-in definitions.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct TractSet {
    pub tracts: Vec<TractEntry>,
}

impl TractSet {
    /// The built-in reference set, expressed as a serializable document.
    pub fn builtin() -> Self {
        Self {
            tracts: default_tracts()
                .into_iter()
                .map(|tract| TractEntry {
                    name: tract.name,
                    seeds: tract.seeds,
                    exclude: tract.exclude,
                    description: None,
                })
                .collect(),
        }
    }

    /// Load a tract set from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, TractSetError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load a tract set from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, TractSetError> {
        let set: TractSet = toml::from_str(content)?;
        Ok(set)
    }

    /// Load a tract set from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, TractSetError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Load a tract set from a JSON string
    pub fn from_json(content: &str) -> Result<Self, TractSetError> {
        let set: TractSet = serde_json::from_str(content)?;
        Ok(set)
    }

    /// Auto-detect file format and load the tract set
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TractSetError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(TractSetError::UnsupportedFileFormat),
        }
    }

    /// Save the tract set to a TOML string
    pub fn to_toml(&self) -> Result<String, TractSetError> {
        let toml = toml::to_string_pretty(&self)?;
        Ok(toml)
    }

    /// Save the tract set to a JSON string
    pub fn to_json(&self) -> Result<String, TractSetError> {
        let json = serde_json::to_string_pretty(&self)?;
        Ok(json)
    }

    /// Validate the entries and convert them into pipeline definitions.
    pub fn definitions(&self) -> Result<Vec<TractDefinition>, TractSetError> {
        self.tracts
            .iter()
            .map(|entry| {
                if entry.seeds.is_empty() {
                    return Err(TractSetError::MissingSeeds(entry.name.clone()));
                }
                let mut tract = TractDefinition::new(&entry.name, entry.seeds.clone());
                if let Some(exclude) = &entry.exclude {
                    tract = tract.with_exclude(exclude);
                }
                Ok(tract)
            })
            .collect()
    }
}
