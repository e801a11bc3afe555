//! Error types for scanflow.
//!
//! Errors that stay inside one unit (a subject, run and stage) are carried
//! by [`crate::stages::ExecutionResult`]; the types here cover templating,
//! external commands, cleanup, configuration and pipeline definitions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for scanflow operations.
#[derive(Debug, Error)]
pub enum ScanflowError {
    /// A pipeline definition failed validation.
    #[error("{0}")]
    Validation(#[from] PipelineValidationError),

    /// A template could not be resolved.
    #[error("{0}")]
    Template(#[from] TemplateError),

    /// The runtime configuration is unusable.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// An external command could not be run or exited non-zero.
    #[error("{0}")]
    Command(#[from] CommandError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A template references a placeholder that has no binding.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Unbound placeholder '{{{placeholder}}}' in template '{template}'")]
pub struct UnboundPlaceholderError {
    /// The placeholder name without braces.
    pub placeholder: String,
    /// The template source that referenced it.
    pub template: String,
}

impl UnboundPlaceholderError {
    /// Creates a new unbound placeholder error.
    #[must_use]
    pub fn new(placeholder: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
            template: template.into(),
        }
    }
}

/// Errors raised while resolving a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A placeholder had no binding.
    #[error(transparent)]
    Unbound(#[from] UnboundPlaceholderError),

    /// A zero-padded placeholder was bound to a non-numeric value.
    #[error("Placeholder '{{{placeholder}}}' requires a numeric value for padding, got '{value}'")]
    NotNumeric {
        /// The placeholder name.
        placeholder: String,
        /// The offending value.
        value: String,
    },
}

/// An external command exited with a non-zero status.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Command failed with {}: {command}", describe_status(.exit_status))]
pub struct CommandFailedError {
    /// The fully resolved command line.
    pub command: String,
    /// The exit code, or `None` when the process was killed by a signal.
    pub exit_status: Option<i32>,
}

impl CommandFailedError {
    /// Creates a new command failure.
    #[must_use]
    pub fn new(command: impl Into<String>, exit_status: Option<i32>) -> Self {
        Self {
            command: command.into(),
            exit_status,
        }
    }
}

fn describe_status(status: &Option<i32>) -> String {
    status.map_or_else(|| "signal".to_string(), |code| format!("exit status {code}"))
}

/// Errors produced by a [`crate::runner::CommandRunner`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The process ran and exited non-zero.
    #[error(transparent)]
    Failed(#[from] CommandFailedError),

    /// The process could not be started at all.
    #[error("Failed to spawn '{command}': {message}")]
    Spawn {
        /// The command line.
        command: String,
        /// The OS error message.
        message: String,
    },
}

impl CommandError {
    /// Creates a spawn error.
    #[must_use]
    pub fn spawn(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Spawn {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// Removing an intermediate path failed. Logged, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Could not remove '{}': {message}", .path.display())]
pub struct CleanupError {
    /// The path that could not be removed.
    pub path: PathBuf,
    /// The underlying error message.
    pub message: String,
}

impl CleanupError {
    /// Creates a new cleanup error.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Errors raised while loading or checking the runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required root directory was not configured.
    #[error("Root '{key}' is not configured (set {env_var} or add it to the config file)")]
    MissingRoot {
        /// The config key, e.g. `outputRoot`.
        key: String,
        /// The environment variable that would supply it.
        env_var: String,
    },

    /// A configured root directory does not exist.
    #[error("Root '{key}' points to '{}', which is not a directory", .path.display())]
    RootNotFound {
        /// The config key.
        key: String,
        /// The configured path.
        path: PathBuf,
    },

    /// The config file could not be read or parsed.
    #[error("Could not load config file '{}': {message}", .path.display())]
    File {
        /// The config file path.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// A configured root is not valid UTF-8 and cannot be substituted
    /// into templates.
    #[error("Root '{key}' path '{}' is not valid UTF-8", .path.display())]
    NonUtf8Root {
        /// The config key.
        key: String,
        /// The configured path.
        path: PathBuf,
    },

    /// A `key=value` variable assignment was malformed.
    #[error("Invalid variable assignment '{0}', expected key=value")]
    InvalidVariable(String),
}

impl ConfigError {
    /// Returns true if the error concerns a missing or absent root directory.
    #[must_use]
    pub fn is_missing_root(&self) -> bool {
        matches!(self, Self::MissingRoot { .. } | Self::RootNotFound { .. })
    }
}

/// Diagnostic metadata attached to a pipeline definition error.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ContractErrorInfo {
    /// Error code (e.g., "PIPELINE-UNKNOWN-PLACEHOLDER").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ContractErrorInfo {
    /// Creates a new contract error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Error raised when a pipeline definition is invalid.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct PipelineValidationError {
    /// The error message.
    pub message: String,
    /// The stages involved in the error.
    pub stages: Vec<String>,
    /// Optional contract error info.
    pub error_info: Option<ContractErrorInfo>,
}

impl PipelineValidationError {
    /// Creates a new pipeline validation error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stages: Vec::new(),
            error_info: None,
        }
    }

    /// Sets the stages involved.
    #[must_use]
    pub fn with_stages(mut self, stages: Vec<String>) -> Self {
        self.stages = stages;
        self
    }

    /// Sets the contract error info.
    #[must_use]
    pub fn with_error_info(mut self, info: ContractErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// Returns the error code, if any.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.error_info.as_ref().map(|info| info.code.as_str())
    }

    /// Converts to a JSON object.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::json!({
            "message": self.message,
            "stages": self.stages,
            "error_info": self.error_info,
        })
    }
}

/// Default suggestions for pipeline definition error codes.
pub struct ContractSuggestions;

impl ContractSuggestions {
    /// Gets a suggestion for a given error code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            "PIPELINE-EMPTY" => Some("Add at least one stage to the pipeline."),
            "PIPELINE-DUPLICATE-STAGE" => {
                Some("Stage names must be unique within a pipeline; rename one of them.")
            }
            "PIPELINE-UNKNOWN-PLACEHOLDER" => Some(
                "Declare the path as an input, output or work directory, add a stage \
                 parameter, or pass it with --set key=value.",
            ),
            "PIPELINE-NO-COMMANDS" => Some("Give the stage at least one command step."),
            "PIPELINE-NAME-CLASH" => {
                Some("Path names share a namespace with roots, parameters, subject and run.")
            }
            "PIPELINE-UNKNOWN" => Some("Run `scanflow list` to see the available pipelines."),
            _ => None,
        }
    }
}
