//! Stage specifications.

use crate::errors::{ContractErrorInfo, PipelineValidationError, TemplateError};
use crate::paths::{Bindings, Template, STATUS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// A path template with the name commands use to refer to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedPath {
    /// Placeholder name visible to commands, cleanup and report templates.
    pub name: String,
    /// The path template.
    pub template: Template,
}

impl NamedPath {
    /// Creates a named path.
    #[must_use]
    pub fn new(name: impl Into<String>, template: impl Into<Template>) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
        }
    }
}

/// One external command of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CommandStepRepr", rename_all = "camelCase")]
pub struct CommandStep {
    /// The command template.
    pub command: Template,
    /// Echoed before the command runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The step is skipped when all of these paths already exist.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_if_exists: Vec<Template>,
}

impl CommandStep {
    /// Creates a step from a command template.
    #[must_use]
    pub fn new(command: impl Into<Template>) -> Self {
        Self {
            command: command.into(),
            description: None,
            skip_if_exists: Vec::new(),
        }
    }

    /// Sets the description echoed before the command.
    #[must_use]
    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a path that, together with the others, makes the step redundant.
    #[must_use]
    pub fn skip_if_exists(mut self, path: impl Into<Template>) -> Self {
        self.skip_if_exists.push(path.into());
        self
    }
}

// Pipeline files may give a step as a bare command string.
#[derive(Deserialize)]
#[serde(untagged)]
enum CommandStepRepr {
    Plain(Template),
    #[serde(rename_all = "camelCase")]
    Full {
        command: Template,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        skip_if_exists: Vec<Template>,
    },
}

impl From<CommandStepRepr> for CommandStep {
    fn from(repr: CommandStepRepr) -> Self {
        match repr {
            CommandStepRepr::Plain(command) => Self::new(command),
            CommandStepRepr::Full {
                command,
                description,
                skip_if_exists,
            } => Self {
                command,
                description,
                skip_if_exists,
            },
        }
    }
}

/// A named processing step: declared paths, commands and cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSpec {
    /// Unique name within the pipeline.
    pub name: String,
    /// Paths that must exist before the stage runs.
    #[serde(default)]
    pub inputs: Vec<NamedPath>,
    /// Paths the stage produces; all present means the stage is done.
    #[serde(default)]
    pub outputs: Vec<NamedPath>,
    /// Directories created before the first command.
    #[serde(default)]
    pub work_dirs: Vec<NamedPath>,
    /// Commands run in order; the first failure aborts the rest.
    pub commands: Vec<CommandStep>,
    /// Paths or globs removed after the commands, whatever their outcome.
    #[serde(default)]
    pub cleanup: Vec<Template>,
    /// Stage-level defaults, overridable with pipeline variables.
    #[serde(default)]
    pub params: Bindings,
    /// Report fragment rendered after the unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<Template>,
}

/// A single command with every placeholder substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStep {
    /// Description to echo.
    pub description: Option<String>,
    /// The command line.
    pub command: String,
    /// Paths whose joint existence skips this step.
    pub skip_if_exists: Vec<PathBuf>,
}

/// A stage resolved for one (subject, run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStage {
    /// Every binding visible to commands, including the declared paths.
    pub bindings: Bindings,
    /// Resolved inputs.
    pub inputs: Vec<PathBuf>,
    /// Resolved outputs.
    pub outputs: Vec<PathBuf>,
    /// Resolved work directories.
    pub work_dirs: Vec<PathBuf>,
    /// Resolved command steps.
    pub steps: Vec<ResolvedStep>,
    /// Resolved cleanup entries.
    pub cleanup: Vec<PathBuf>,
}

impl StageSpec {
    /// Creates an empty stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            work_dirs: Vec::new(),
            commands: Vec::new(),
            cleanup: Vec::new(),
            params: Bindings::new(),
            report: None,
        }
    }

    /// Declares an input path.
    #[must_use]
    pub fn input(mut self, name: impl Into<String>, template: impl Into<Template>) -> Self {
        self.inputs.push(NamedPath::new(name, template));
        self
    }

    /// Declares an output path.
    #[must_use]
    pub fn output(mut self, name: impl Into<String>, template: impl Into<Template>) -> Self {
        self.outputs.push(NamedPath::new(name, template));
        self
    }

    /// Declares a work directory.
    #[must_use]
    pub fn work_dir(mut self, name: impl Into<String>, template: impl Into<Template>) -> Self {
        self.work_dirs.push(NamedPath::new(name, template));
        self
    }

    /// Appends a plain command.
    #[must_use]
    pub fn command(self, template: impl Into<Template>) -> Self {
        self.step(CommandStep::new(template))
    }

    /// Appends a command step.
    #[must_use]
    pub fn step(mut self, step: CommandStep) -> Self {
        self.commands.push(step);
        self
    }

    /// Appends a cleanup path or glob.
    #[must_use]
    pub fn cleanup(mut self, template: impl Into<Template>) -> Self {
        self.cleanup.push(template.into());
        self
    }

    /// Sets a stage parameter.
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key, value);
        self
    }

    /// Sets the report fragment template.
    #[must_use]
    pub fn report(mut self, template: impl Into<Template>) -> Self {
        self.report = Some(template.into());
        self
    }

    fn declared_paths(&self) -> impl Iterator<Item = &NamedPath> {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .chain(self.work_dirs.iter())
    }

    /// Resolves every template of the stage against `scope`.
    ///
    /// Path templates see `scope` only; commands and cleanup entries also see
    /// each declared path under its name.
    ///
    /// # Errors
    ///
    /// Returns the first template that cannot be resolved.
    pub fn resolve(&self, scope: &Bindings) -> Result<ResolvedStage, TemplateError> {
        let inputs = resolve_named(&self.inputs, scope)?;
        let outputs = resolve_named(&self.outputs, scope)?;
        let work_dirs = resolve_named(&self.work_dirs, scope)?;

        let mut bindings = scope.clone();
        for (name, path) in inputs.iter().chain(&outputs).chain(&work_dirs) {
            bindings.insert(name.clone(), path.clone());
        }

        let mut steps = Vec::with_capacity(self.commands.len());
        for step in &self.commands {
            steps.push(ResolvedStep {
                description: step.description.clone(),
                command: step.command.resolve(&bindings)?,
                skip_if_exists: resolve_all(&step.skip_if_exists, &bindings)?,
            });
        }
        let cleanup = resolve_all(&self.cleanup, &bindings)?;

        let strip = |paths: Vec<(String, String)>| -> Vec<PathBuf> {
            paths.into_iter().map(|(_, p)| PathBuf::from(p)).collect()
        };

        Ok(ResolvedStage {
            bindings,
            inputs: strip(inputs),
            outputs: strip(outputs),
            work_dirs: strip(work_dirs),
            steps,
            cleanup,
        })
    }

    /// Checks that every placeholder the stage uses will be bound at run time.
    ///
    /// `known` holds the names supplied outside the stage: config roots,
    /// pipeline variables, `subject` and `run`.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty name, a stage without commands, a path
    /// name that clashes with another binding, or an unknown placeholder.
    pub fn validate(&self, known: &BTreeSet<String>) -> Result<(), PipelineValidationError> {
        if self.name.trim().is_empty() {
            return Err(PipelineValidationError::new("Stage name cannot be empty"));
        }

        if self.commands.is_empty() {
            return Err(PipelineValidationError::new(format!(
                "Stage '{}' has no commands",
                self.name
            ))
            .with_stages(vec![self.name.clone()])
            .with_error_info(
                ContractErrorInfo::new("PIPELINE-NO-COMMANDS", "Stage has nothing to run")
                    .with_fix_hint("Give the stage at least one command step."),
            ));
        }

        let mut path_scope: BTreeSet<String> = known.clone();
        path_scope.extend(self.params.keys().map(str::to_string));

        let mut command_scope = path_scope.clone();
        for path in self.declared_paths() {
            if !is_identifier(&path.name)
                || path_scope.contains(&path.name)
                || !command_scope.insert(path.name.clone())
            {
                return Err(self.name_clash(&path.name));
            }
        }

        for path in self.declared_paths() {
            self.check_template(&path.template, &path_scope)?;
        }

        for step in &self.commands {
            self.check_template(&step.command, &command_scope)?;
            for guard in &step.skip_if_exists {
                self.check_template(guard, &command_scope)?;
            }
        }

        for entry in &self.cleanup {
            self.check_template(entry, &command_scope)?;
        }

        if let Some(report) = &self.report {
            let mut report_scope = command_scope;
            report_scope.insert(STATUS.to_string());
            self.check_template(report, &report_scope)?;
        }

        Ok(())
    }

    fn check_template(
        &self,
        template: &Template,
        scope: &BTreeSet<String>,
    ) -> Result<(), PipelineValidationError> {
        match template.placeholders().find(|name| !scope.contains(*name)) {
            None => Ok(()),
            Some(unknown) => Err(PipelineValidationError::new(format!(
                "Stage '{}' references unknown placeholder '{{{}}}' in '{}'",
                self.name, unknown, template
            ))
            .with_stages(vec![self.name.clone()])
            .with_error_info(
                ContractErrorInfo::new(
                    "PIPELINE-UNKNOWN-PLACEHOLDER",
                    format!("'{unknown}' is never bound"),
                )
                .with_fix_hint(
                    "Declare it as an input, output or work directory, add a stage \
                     parameter, or pass it with --set key=value.",
                )
                .with_context_entry("template", template.as_str()),
            )),
        }
    }

    fn name_clash(&self, name: &str) -> PipelineValidationError {
        PipelineValidationError::new(format!(
            "Stage '{}' declares path name '{}' that is invalid or already bound",
            self.name, name
        ))
        .with_stages(vec![self.name.clone()])
        .with_error_info(
            ContractErrorInfo::new("PIPELINE-NAME-CLASH", format!("'{name}' cannot be used"))
                .with_fix_hint(
                    "Path names must be identifiers distinct from roots, parameters, \
                     subject, run and each other.",
                ),
        )
    }
}

fn resolve_named(
    paths: &[NamedPath],
    scope: &Bindings,
) -> Result<Vec<(String, String)>, TemplateError> {
    let mut resolved = Vec::with_capacity(paths.len());
    for path in paths {
        resolved.push((path.name.clone(), path.template.resolve(scope)?));
    }
    Ok(resolved)
}

fn resolve_all(templates: &[Template], bindings: &Bindings) -> Result<Vec<PathBuf>, TemplateError> {
    templates
        .iter()
        .map(|t| t.resolve(bindings).map(PathBuf::from))
        .collect()
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
