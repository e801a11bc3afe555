//! Execution of one stage for one (subject, run).

use super::cleanup::CleanupScope;
use super::result::{ExecutionResult, StageFailure, UnitKey, UnitReport};
use super::spec::{ResolvedStage, StageSpec};
use crate::gate::{ExistenceGate, GateDecision};
use crate::observability::SpanTimer;
use crate::paths::{Bindings, STATUS};
use crate::runner::CommandRunner;
use chrono::Utc;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Runs stages through the gate, the command runner and cleanup.
///
/// Bindings are layered, later layers winning: config roots, then the
/// stage's own parameters, then pipeline variables, then `subject` and
/// `run`.
#[derive(Clone)]
pub struct StageExecutor {
    runner: Arc<dyn CommandRunner>,
    gate: ExistenceGate,
    roots: Bindings,
    variables: Bindings,
}

impl fmt::Debug for StageExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageExecutor")
            .field("roots", &self.roots)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

impl StageExecutor {
    /// Creates an executor with no root or variable bindings.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            gate: ExistenceGate::new(),
            roots: Bindings::new(),
            variables: Bindings::new(),
        }
    }

    /// Sets the root directory bindings.
    #[must_use]
    pub fn with_roots(mut self, roots: Bindings) -> Self {
        self.roots = roots;
        self
    }

    /// Sets the pipeline variables (`--set key=value`).
    #[must_use]
    pub fn with_variables(mut self, variables: Bindings) -> Self {
        self.variables = variables;
        self
    }

    /// Returns the root bindings.
    #[must_use]
    pub fn roots(&self) -> &Bindings {
        &self.roots
    }

    /// Returns the pipeline variables.
    #[must_use]
    pub fn variables(&self) -> &Bindings {
        &self.variables
    }

    /// Builds the bindings a stage's path templates see for one unit.
    #[must_use]
    pub fn scope(&self, stage: &StageSpec, subject: &str, run: &str) -> Bindings {
        self.roots
            .layered(&stage.params)
            .layered(&self.variables)
            .layered(&Bindings::for_unit(subject, run))
    }

    /// Runs `stage` for (`subject`, `run`).
    ///
    /// Never panics on unit-level problems: resolution errors, gate
    /// decisions and command failures all end up in the returned report.
    pub async fn run(&self, stage: &StageSpec, subject: &str, run: &str) -> UnitReport {
        let key = UnitKey::new(subject, run, &stage.name);
        let started_at = Utc::now();
        let timer = SpanTimer::start(key.to_string());
        info!(unit = %key, "Starting unit");

        let scope = self.scope(stage, subject, run);
        let (result, commands_issued, fragment) = match stage.resolve(&scope) {
            Ok(resolved) => self.run_resolved(stage, &resolved).await,
            Err(err) => {
                error!(unit = %key, error = %err, "Could not resolve stage templates");
                (ExecutionResult::Failed(err.into()), 0, None)
            }
        };

        let duration_ms = timer.finish().as_secs_f64() * 1000.0;
        match &result {
            ExecutionResult::Failed(failure) => {
                error!(unit = %key, duration_ms, error = %failure, "Unit failed");
            }
            other => info!(unit = %key, duration_ms, outcome = other.label(), "Unit finished"),
        }

        UnitReport {
            key,
            result,
            started_at,
            duration_ms,
            commands_issued,
            fragment,
        }
    }

    async fn run_resolved(
        &self,
        stage: &StageSpec,
        resolved: &ResolvedStage,
    ) -> (ExecutionResult, usize, Option<String>) {
        match self.gate.check(&resolved.inputs, &resolved.outputs).await {
            GateDecision::MissingInputs(missing) => {
                warn!(stage = %stage.name, missing = missing.len(), "Skipping stage, inputs missing");
                let result = ExecutionResult::SkippedMissingInputs {
                    missing: missing.into_iter().collect(),
                };
                (result, 0, None)
            }
            GateDecision::OutputsExist => {
                info!(stage = %stage.name, "Skipping stage, outputs already exist");
                let result = ExecutionResult::SkippedOutputsExist;
                let fragment = render_fragment(stage, &resolved.bindings, &result);
                (result, 0, fragment)
            }
            GateDecision::Proceed => {
                let (result, issued) = self.run_steps(resolved).await;

                let cleanup = CleanupScope::new(resolved.cleanup.clone());
                if !cleanup.is_empty() {
                    let report = cleanup.run().await;
                    debug!(
                        stage = %stage.name,
                        removed = report.removed.len(),
                        failed = report.errors.len(),
                        "Cleanup finished"
                    );
                }

                let fragment = render_fragment(stage, &resolved.bindings, &result);
                (result, issued, fragment)
            }
        }
    }

    async fn run_steps(&self, resolved: &ResolvedStage) -> (ExecutionResult, usize) {
        if let Err(failure) = prepare_directories(resolved).await {
            return (ExecutionResult::Failed(failure), 0);
        }

        let mut issued = 0;
        for step in &resolved.steps {
            if !step.skip_if_exists.is_empty()
                && self.gate.all_outputs_exist(&step.skip_if_exists).await
            {
                info!(command = %step.command, "Skipping command, its outputs exist");
                continue;
            }
            if let Some(description) = &step.description {
                info!("{description}");
            }

            issued += 1;
            if let Err(err) = self.runner.execute(&step.command).await {
                return (ExecutionResult::Failed(err.into()), issued);
            }
        }

        (ExecutionResult::Succeeded, issued)
    }
}

async fn prepare_directories(resolved: &ResolvedStage) -> Result<(), StageFailure> {
    let parents = resolved
        .outputs
        .iter()
        .filter_map(|output| output.parent())
        .filter(|parent| !parent.as_os_str().is_empty());

    for dir in parents.chain(resolved.work_dirs.iter().map(|d| d.as_path())) {
        create_dir(dir).await?;
    }
    Ok(())
}

async fn create_dir(dir: &Path) -> Result<(), StageFailure> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| StageFailure::Io {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })
}

// Units skipped for missing inputs never render a fragment.
fn render_fragment(
    stage: &StageSpec,
    bindings: &Bindings,
    result: &ExecutionResult,
) -> Option<String> {
    let template = stage.report.as_ref()?;
    let bindings = bindings.clone().with(STATUS, result.label());
    match template.resolve(&bindings) {
        Ok(fragment) => Some(fragment),
        Err(err) => {
            warn!(stage = %stage.name, error = %err, "Could not render report fragment");
            None
        }
    }
}
