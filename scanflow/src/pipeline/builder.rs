//! Pipeline builder with validation.

use super::spec::duplicate_stage;
use super::Pipeline;
use crate::errors::{ContractErrorInfo, PipelineValidationError};
use crate::stages::StageSpec;

/// Builder for creating pipelines stage by stage.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    description: Option<String>,
    stages: Vec<StageSpec>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            stages: Vec::new(),
        }
    }

    /// Sets the pipeline description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Appends a stage.
    ///
    /// # Errors
    ///
    /// Returns an error if a stage with the same name was already added.
    pub fn stage(mut self, stage: StageSpec) -> Result<Self, PipelineValidationError> {
        self.add_stage(stage)?;
        Ok(self)
    }

    /// Appends a stage in place.
    ///
    /// # Errors
    ///
    /// Returns an error if a stage with the same name was already added.
    pub fn add_stage(&mut self, stage: StageSpec) -> Result<(), PipelineValidationError> {
        if self.stages.iter().any(|s| s.name == stage.name) {
            return Err(duplicate_stage(&stage.name));
        }
        self.stages.push(stage);
        Ok(())
    }

    /// Appends the stages of another builder.
    ///
    /// A stage present in both is kept once if the definitions are identical.
    ///
    /// # Errors
    ///
    /// Returns an error if the same stage name has different definitions.
    pub fn compose(mut self, other: Self) -> Result<Self, PipelineValidationError> {
        self.name = format!("{}+{}", self.name, other.name);

        for stage in other.stages {
            match self.stages.iter().find(|s| s.name == stage.name) {
                Some(existing) if *existing == stage => {}
                Some(_) => return Err(duplicate_stage(&stage.name)),
                None => self.stages.push(stage),
            }
        }

        Ok(self)
    }

    /// Builds the pipeline.
    ///
    /// Placeholder checks need the run's variables and happen later in
    /// [`Pipeline::validate_with`].
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or there are no stages.
    pub fn build(self) -> Result<Pipeline, PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Pipeline name cannot be empty"));
        }
        if self.stages.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Pipeline '{}' has no stages",
                self.name
            ))
            .with_error_info(
                ContractErrorInfo::new("PIPELINE-EMPTY", "Cannot build an empty pipeline")
                    .with_fix_hint("Add at least one stage to the pipeline before building."),
            ));
        }

        let pipeline = Pipeline::new(self.name, self.stages);
        Ok(match self.description {
            Some(description) => pipeline.with_description(description),
            None => pipeline,
        })
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn touch(name: &str) -> StageSpec {
        StageSpec::new(name)
            .output("out", format!("{{output_root}}/{{subject}}/{name}.nii"))
            .command("touch {out}")
    }

    #[test]
    fn test_builder_creation() {
        let builder = PipelineBuilder::new("test");
        assert_eq!(builder.name(), "test");
        assert_eq!(builder.stage_count(), 0);
    }

    #[test]
    fn test_builder_keeps_order() {
        let pipeline = PipelineBuilder::new("anat")
            .description("Anatomical preprocessing")
            .stage(touch("skullstrip"))
            .unwrap()
            .stage(touch("segment"))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(pipeline.stage_names(), vec!["skullstrip", "segment"]);
        assert_eq!(pipeline.description.as_deref(), Some("Anatomical preprocessing"));
    }

    #[test]
    fn test_builder_duplicate_stage() {
        let err = PipelineBuilder::new("anat")
            .stage(touch("skullstrip"))
            .unwrap()
            .stage(touch("skullstrip"))
            .unwrap_err();

        assert_eq!(err.code(), Some("PIPELINE-DUPLICATE-STAGE"));
    }

    #[test]
    fn test_builder_empty_build() {
        let err = PipelineBuilder::new("test").build().unwrap_err();
        assert_eq!(err.code(), Some("PIPELINE-EMPTY"));
    }

    #[test]
    fn test_builder_compose() {
        let a = PipelineBuilder::new("a")
            .stage(touch("skullstrip"))
            .unwrap();
        let b = PipelineBuilder::new("b")
            .stage(touch("skullstrip"))
            .unwrap()
            .stage(touch("segment"))
            .unwrap();

        let composed = a.compose(b).unwrap();
        assert_eq!(composed.name(), "a+b");
        assert_eq!(composed.stage_count(), 2);
    }

    #[test]
    fn test_builder_compose_conflict() {
        let a = PipelineBuilder::new("a")
            .stage(touch("skullstrip"))
            .unwrap();
        let b = PipelineBuilder::new("b")
            .stage(touch("skullstrip").command("echo again"))
            .unwrap();

        assert!(a.compose(b).is_err());
    }
}
