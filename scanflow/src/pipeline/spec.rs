//! Pipeline specification.

use crate::config::RootsConfig;
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::paths::{Bindings, RUN, SUBJECT};
use crate::stages::StageSpec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// An ordered list of stages run for every (subject, run).
///
/// Stage order is the caller's responsibility: a stage only depends on an
/// earlier one through the files it reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    /// Pipeline name, used on the command line and as the report title.
    pub name: String,
    /// One-line description shown by `scanflow list`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Stages in execution order.
    pub stages: Vec<StageSpec>,
}

impl Pipeline {
    /// Creates a pipeline from stages without validating it.
    #[must_use]
    pub fn new(name: impl Into<String>, stages: Vec<StageSpec>) -> Self {
        Self {
            name: name.into(),
            description: None,
            stages,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Returns the stage named `name`.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns the stage names in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns true if any stage template mentions `{placeholder}`.
    #[must_use]
    pub fn uses_placeholder(&self, placeholder: &str) -> bool {
        self.stages.iter().any(|stage| {
            let paths = stage
                .inputs
                .iter()
                .chain(&stage.outputs)
                .chain(&stage.work_dirs)
                .map(|p| &p.template);
            let steps = stage
                .commands
                .iter()
                .flat_map(|step| std::iter::once(&step.command).chain(&step.skip_if_exists));
            paths
                .chain(steps)
                .chain(&stage.cleanup)
                .chain(&stage.report)
                .any(|t| t.placeholders().any(|p| p == placeholder))
        })
    }

    /// Validates the pipeline against an explicit set of externally bound names.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty pipeline, duplicate stage names or any
    /// stage-level problem.
    pub fn validate(&self, known: &BTreeSet<String>) -> Result<(), PipelineValidationError> {
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Pipeline '{}' has no stages",
                self.name
            ))
            .with_error_info(
                ContractErrorInfo::new("PIPELINE-EMPTY", "Cannot run an empty pipeline")
                    .with_fix_hint("Add at least one stage to the pipeline."),
            ));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(duplicate_stage(&stage.name));
            }
        }

        for stage in &self.stages {
            stage.validate(known)?;
        }

        Ok(())
    }

    /// Validates the pipeline for a run with the standard roots, `subject`,
    /// `run` and the given pipeline variables bound.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::validate`].
    pub fn validate_with(&self, variables: &Bindings) -> Result<(), PipelineValidationError> {
        self.validate(&known_names(variables))
    }
}

/// Names bound outside any stage: roots, variables, `subject` and `run`.
#[must_use]
pub fn known_names(variables: &Bindings) -> BTreeSet<String> {
    RootsConfig::binding_names()
        .chain([SUBJECT, RUN])
        .map(str::to_string)
        .chain(variables.keys().map(str::to_string))
        .collect()
}

pub(crate) fn duplicate_stage(name: &str) -> PipelineValidationError {
    PipelineValidationError::new(format!("Duplicate stage name '{name}'"))
        .with_stages(vec![name.to_string()])
        .with_error_info(
            ContractErrorInfo::new(
                "PIPELINE-DUPLICATE-STAGE",
                format!("Stage '{name}' appears more than once"),
            )
            .with_fix_hint("Stage names must be unique within a pipeline."),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn skullstrip() -> StageSpec {
        StageSpec::new("skullstrip")
            .input("mprage", "{orig_root}/{subject}/mprage.nii.gz")
            .output("brain", "{output_root}/{subject}/brain.nii.gz")
            .command("bet {mprage} {brain}")
    }

    #[test]
    fn test_validate_with_standard_names() {
        let pipeline = Pipeline::new("anat", vec![skullstrip()]);
        assert!(pipeline.validate_with(&Bindings::new()).is_ok());
    }

    #[test]
    fn test_empty_pipeline() {
        let err = Pipeline::new("empty", vec![]).validate_with(&Bindings::new()).unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-EMPTY"));
    }

    #[test]
    fn test_duplicate_stage() {
        let pipeline = Pipeline::new("anat", vec![skullstrip(), skullstrip()]);
        let err = pipeline.validate_with(&Bindings::new()).unwrap_err();

        assert_eq!(err.code(), Some("PIPELINE-DUPLICATE-STAGE"));
        assert_eq!(err.stages, vec!["skullstrip".to_string()]);
    }

    #[test]
    fn test_variables_satisfy_placeholders() {
        let smooth = StageSpec::new("smooth").command("3dmerge -1blur_fwhm {fwhm} -doall x");
        let pipeline = Pipeline::new("func", vec![smooth]);

        assert!(pipeline.validate_with(&Bindings::new()).is_err());
        assert!(pipeline
            .validate_with(&Bindings::new().with("fwhm", "6"))
            .is_ok());
    }

    #[test]
    fn test_known_names_include_variables() {
        let variables = Bindings::new().with("fwhm", "6").with("scan", "movie");
        let known = known_names(&variables);

        assert_eq!(
            known.into_iter().collect::<Vec<_>>(),
            vec![
                "fwhm",
                "orig_root",
                "output_root",
                "reference_root",
                "report_root",
                "run",
                "scan",
                "subject"
            ]
        );
    }

    #[test]
    fn test_uses_placeholder() {
        let pipeline = Pipeline::new("anat", vec![skullstrip()]);
        assert!(pipeline.uses_placeholder("orig_root"));
        assert!(!pipeline.uses_placeholder("reference_root"));
        assert_eq!(pipeline.stage_names(), vec!["skullstrip"]);
    }
}
