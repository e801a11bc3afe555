//! Named pipelines: the built-in set plus user definitions.

use super::{builtin, Pipeline};
use crate::errors::{ContractErrorInfo, PipelineValidationError, ScanflowError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// The contents of a pipeline definition file.
///
/// ```json
/// { "pipelines": [ { "name": "...", "stages": [ ... ] } ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipelines defined in the file.
    #[serde(default)]
    pub pipelines: Vec<Pipeline>,
}

impl PipelineDefinition {
    /// Parses a definition from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ScanflowError::Serialization`] for malformed JSON.
    pub fn from_json(text: &str) -> Result<Self, ScanflowError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads a definition file.
    ///
    /// # Errors
    ///
    /// Returns an I/O or serialization error.
    pub fn from_file(path: &Path) -> Result<Self, ScanflowError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

/// Pipelines addressable by name.
#[derive(Debug, Clone, Default)]
pub struct PipelineCatalog {
    pipelines: BTreeMap<String, Pipeline>,
}

impl PipelineCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog holding the built-in pipelines.
    #[must_use]
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for pipeline in builtin::all() {
            catalog.insert(pipeline);
        }
        catalog
    }

    /// Creates the built-in catalog and overlays `file`, if given.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(file: Option<&Path>) -> Result<Self, ScanflowError> {
        let mut catalog = Self::builtin();
        if let Some(path) = file {
            let definition = PipelineDefinition::from_file(path)?;
            info!(
                path = %path.display(),
                count = definition.pipelines.len(),
                "Loaded pipeline definitions"
            );
            catalog.extend(definition);
        }
        Ok(catalog)
    }

    /// Adds or replaces a pipeline.
    pub fn insert(&mut self, pipeline: Pipeline) {
        if self.pipelines.contains_key(&pipeline.name) {
            debug!(pipeline = %pipeline.name, "Replacing pipeline definition");
        }
        self.pipelines.insert(pipeline.name.clone(), pipeline);
    }

    /// Adds every pipeline in `definition`, replacing same-named ones.
    pub fn extend(&mut self, definition: PipelineDefinition) {
        for pipeline in definition.pipelines {
            self.insert(pipeline);
        }
    }

    /// Looks up a pipeline by name.
    ///
    /// # Errors
    ///
    /// Returns a `PIPELINE-UNKNOWN` error naming the available pipelines.
    pub fn get(&self, name: &str) -> Result<&Pipeline, PipelineValidationError> {
        self.pipelines.get(name).ok_or_else(|| {
            let known = self.names().join(", ");
            PipelineValidationError::new(format!("Unknown pipeline '{name}'"))
                .with_error_info(
                    ContractErrorInfo::new("PIPELINE-UNKNOWN", format!("No pipeline named '{name}'"))
                        .with_fix_hint(format!("Available pipelines: {known}"))
                        .with_context_entry("requested", name),
                )
        })
    }

    /// Returns the pipeline names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.pipelines.keys().map(String::as_str).collect()
    }

    /// Iterates over the pipelines in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipelines.values()
    }

    /// Returns the number of pipelines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Returns true if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}
