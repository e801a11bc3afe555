//! Per-unit execution results.

use crate::errors::{CommandError, CommandFailedError, TemplateError, UnboundPlaceholderError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Why a unit ended in [`ExecutionResult::Failed`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StageFailure {
    /// A command exited non-zero.
    #[error(transparent)]
    Command(CommandFailedError),

    /// A template referenced a placeholder with no binding.
    #[error(transparent)]
    Unbound(UnboundPlaceholderError),

    /// Any other template problem.
    #[error("{0}")]
    Template(String),

    /// A command could not be started.
    #[error("Failed to spawn '{command}': {message}")]
    Spawn {
        /// The command line.
        command: String,
        /// The OS error message.
        message: String,
    },

    /// Preparing an output or work directory failed.
    #[error("Could not prepare '{}': {message}", .path.display())]
    Io {
        /// The directory being created.
        path: PathBuf,
        /// The OS error message.
        message: String,
    },
}

impl StageFailure {
    /// Returns the failing command line, if a command was involved.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::Command(err) => Some(&err.command),
            Self::Spawn { command, .. } => Some(command),
            _ => None,
        }
    }

    /// Returns the exit status of a failed command.
    #[must_use]
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            Self::Command(err) => err.exit_status,
            _ => None,
        }
    }
}

impl From<TemplateError> for StageFailure {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::Unbound(unbound) => Self::Unbound(unbound),
            other @ TemplateError::NotNumeric { .. } => Self::Template(other.to_string()),
        }
    }
}

impl From<CommandError> for StageFailure {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Failed(failed) => Self::Command(failed),
            CommandError::Spawn { command, message } => Self::Spawn { command, message },
        }
    }
}

/// Outcome of one (subject, run, stage) unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum ExecutionResult {
    /// Declared inputs were absent; nothing ran.
    SkippedMissingInputs {
        /// The absent inputs.
        missing: Vec<PathBuf>,
    },
    /// Every declared output already existed; nothing ran.
    SkippedOutputsExist,
    /// All commands exited zero.
    Succeeded,
    /// Resolution, preparation or a command failed.
    Failed(StageFailure),
}

impl ExecutionResult {
    /// Returns true for either skip variant.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(
            self,
            Self::SkippedMissingInputs { .. } | Self::SkippedOutputsExist
        )
    }

    /// Returns true if the unit ran and succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true if the unit failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns the failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&StageFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    /// Short label used in summaries and as the report `status` binding.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::SkippedMissingInputs { .. } => "skipped (missing inputs)",
            Self::SkippedOutputsExist => "skipped (outputs exist)",
            Self::Succeeded => "succeeded",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(failure) => write!(f, "failed: {failure}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Identifies one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitKey {
    /// Subject identifier.
    pub subject: String,
    /// Run identifier.
    pub run: String,
    /// Stage name.
    pub stage: String,
}

impl UnitKey {
    /// Creates a unit key.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        run: impl Into<String>,
        stage: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            run: run.into(),
            stage: stage.into(),
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.subject, self.run, self.stage)
    }
}

/// Everything recorded about one executed unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    /// Which unit this is.
    pub key: UnitKey,
    /// What happened.
    pub result: ExecutionResult,
    /// When the executor picked the unit up.
    pub started_at: DateTime<Utc>,
    /// Wall-clock time spent on the unit.
    pub duration_ms: f64,
    /// Number of commands actually handed to the runner.
    pub commands_issued: usize,
    /// Rendered report fragment, if the stage defines one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unit_key_display() {
        assert_eq!(UnitKey::new("A", "1", "skullstrip").to_string(), "A/1/skullstrip");
    }

    #[test]
    fn test_failure_from_command_error() {
        let failure: StageFailure =
            CommandError::Failed(CommandFailedError::new("fast brain.nii", Some(1))).into();

        assert_eq!(failure.command(), Some("fast brain.nii"));
        assert_eq!(failure.exit_status(), Some(1));

        let spawn: StageFailure = CommandError::spawn("bet", "not found").into();
        assert_eq!(spawn.command(), Some("bet"));
        assert_eq!(spawn.exit_status(), None);
    }

    #[test]
    fn test_failure_from_template_error() {
        let failure: StageFailure =
            TemplateError::Unbound(UnboundPlaceholderError::new("scan", "{scan}.nii")).into();
        assert!(matches!(failure, StageFailure::Unbound(ref e) if e.placeholder == "scan"));
    }

    #[test]
    fn test_result_predicates() {
        assert!(ExecutionResult::SkippedOutputsExist.is_skipped());
        assert!(ExecutionResult::SkippedMissingInputs { missing: vec![] }.is_skipped());
        assert!(ExecutionResult::Succeeded.is_success());

        let failed = ExecutionResult::Failed(StageFailure::Template("bad".into()));
        assert!(failed.is_failure());
        assert!(!failed.is_skipped());
        assert_eq!(failed.to_string(), "failed: bad");
    }

    #[test]
    fn test_result_serializes_with_outcome_tag() {
        let failed = ExecutionResult::Failed(StageFailure::Command(CommandFailedError::new(
            "exit 2",
            Some(2),
        )));
        let value = serde_json::to_value(&failed).unwrap();

        assert_eq!(value["outcome"], "failed");
        assert_eq!(value["detail"]["kind"], "command");
        assert_eq!(value["detail"]["detail"]["exit_status"], 2);

        let skipped = serde_json::to_value(ExecutionResult::SkippedOutputsExist).unwrap();
        assert_eq!(skipped["outcome"], "skipped_outputs_exist");
    }
}
