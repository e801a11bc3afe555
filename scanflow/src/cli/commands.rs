//! CLI command definitions for scanflow.

use crate::cancellation::CancellationToken;
use crate::config::{parse_variables, RootsConfig, REFERENCE_ROOT};
use crate::errors::{ConfigError, ContractSuggestions, PipelineValidationError};
use crate::events::LoggingEventSink;
use crate::pipeline::{BatchReport, DriverConfig, Pipeline, PipelineCatalog, PipelineDriver};
use crate::report::{ReportCollector, ReportLayout};
use crate::runner::{CommandRunner, ShellCommandRunner};
use crate::stages::StageExecutor;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn, Level};

/// Staged, resumable runner for per-subject MRI preprocessing pipelines.
#[derive(Parser, Debug)]
#[command(name = "scanflow")]
#[command(about = "Run staged preprocessing pipelines over a batch of subjects")]
#[command(version)]
#[command(
    long_about = "scanflow runs an ordered list of stages for every subject and run.\n\nA stage is skipped when its inputs are missing or its outputs already exist, so a batch can be re-run after a failure.\n\nExample usage:\n  scanflow run anat --subjects sub01,sub02 --report"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,
}

/// Log output format.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run a pipeline for every subject and run.
    Run(RunArgs),

    /// List the known pipelines and their stages.
    #[command(alias = "ls")]
    List(ListArgs),

    /// Validate a pipeline definition without running anything.
    Check(CheckArgs),
}

/// Arguments for `scanflow run`.
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Pipeline name.
    pub pipeline: String,

    /// Subject identifiers, in processing order.
    #[arg(short, long, num_args = 1.., value_delimiter = ',')]
    pub subjects: Vec<String>,

    /// Run identifiers, in processing order.
    #[arg(short, long, num_args = 1.., value_delimiter = ',', default_value = "1")]
    pub runs: Vec<String>,

    /// Stop the batch after the first failed unit.
    #[arg(long)]
    pub stop_on_failure: bool,

    /// Number of subjects processed concurrently.
    #[arg(short, long, default_value = "1")]
    pub jobs: usize,

    /// Pipeline variable, e.g. `--set fwhm=6`. May be repeated.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// JSON file with additional pipeline definitions.
    #[arg(long, env = "SCANFLOW_PIPELINES")]
    pub pipelines: Option<PathBuf>,

    /// Write the assembled report to `<report_root>/<pipeline>.md`.
    #[arg(long)]
    pub report: bool,

    /// JSON file with the root directories.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the batch report as JSON to this file.
    #[arg(long)]
    pub summary_json: Option<PathBuf>,
}

/// Arguments for `scanflow list`.
#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// JSON file with additional pipeline definitions.
    #[arg(long, env = "SCANFLOW_PIPELINES")]
    pub pipelines: Option<PathBuf>,
}

/// Arguments for `scanflow check`.
#[derive(Parser, Debug, Clone)]
pub struct CheckArgs {
    /// Pipeline name.
    pub pipeline: String,

    /// Pipeline variable the check should treat as bound.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub set: Vec<String>,

    /// JSON file with additional pipeline definitions.
    #[arg(long, env = "SCANFLOW_PIPELINES")]
    pub pipelines: Option<PathBuf>,
}

/// Process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every unit succeeded or was skipped.
    Success,
    /// At least one unit failed.
    UnitFailures,
    /// A root directory is unset or missing.
    MissingRoots,
    /// No subjects were given.
    NoSubjects,
    /// The configuration or pipeline definition is invalid.
    InvalidDefinition,
    /// The batch was interrupted.
    Cancelled,
}

impl ExitStatus {
    /// Returns the numeric exit code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::UnitFailures => 1,
            Self::MissingRoots => 2,
            Self::NoSubjects => 3,
            Self::InvalidDefinition => 4,
            Self::Cancelled => 130,
        }
    }

    /// Derives the status of a finished batch.
    #[must_use]
    pub fn of_batch(report: &BatchReport) -> Self {
        if report.is_cancelled() {
            Self::Cancelled
        } else if report.summary.has_failures() {
            Self::UnitFailures
        } else {
            Self::Success
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        Self::from(status.code())
    }
}

/// Parses the command line.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Runs the command selected on the command line.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<ExitStatus> {
    match cli.command {
        Commands::Run(args) => run_command(&args).await,
        Commands::List(args) => Ok(list_command(&args)),
        Commands::Check(args) => Ok(check_command(&args)),
    }
}

async fn run_command(args: &RunArgs) -> anyhow::Result<ExitStatus> {
    let roots = match RootsConfig::load(args.config.as_deref()) {
        Ok(roots) => roots,
        Err(err) => {
            error!(error = %err, "Could not load configuration");
            return Ok(ExitStatus::InvalidDefinition);
        }
    };

    let cancel = Arc::new(CancellationToken::new());
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current unit");
            signal_token.cancel("interrupted");
        }
    });

    execute_run(args, roots, Arc::new(ShellCommandRunner::new()), cancel).await
}

/// Runs a batch with explicit roots, runner and cancellation token.
///
/// Definition and configuration problems are logged and mapped to an
/// [`ExitStatus`]; only failures to write the requested output files are
/// returned as errors.
pub async fn execute_run(
    args: &RunArgs,
    roots: RootsConfig,
    runner: Arc<dyn CommandRunner>,
    cancel: Arc<CancellationToken>,
) -> anyhow::Result<ExitStatus> {
    if args.subjects.is_empty() {
        error!("No subjects given");
        return Ok(ExitStatus::NoSubjects);
    }

    let catalog = match PipelineCatalog::load(args.pipelines.as_deref()) {
        Ok(catalog) => catalog,
        Err(err) => {
            error!(error = %err, "Could not load pipeline definitions");
            return Ok(ExitStatus::InvalidDefinition);
        }
    };
    let variables = match parse_variables(&args.set) {
        Ok(variables) => variables,
        Err(err) => {
            error!(error = %err, "Invalid pipeline variable");
            return Ok(ExitStatus::InvalidDefinition);
        }
    };
    let pipeline = match catalog
        .get(&args.pipeline)
        .and_then(|p| p.validate_with(&variables).map(|()| p))
    {
        Ok(pipeline) => pipeline,
        Err(err) => {
            log_definition_error(&err);
            return Ok(ExitStatus::InvalidDefinition);
        }
    };

    if let Err(err) = roots.validate(pipeline.uses_placeholder(REFERENCE_ROOT)) {
        error!(error = %err, "Invalid root configuration");
        return Ok(root_status(&err));
    }

    let root_bindings = match roots.bindings() {
        Ok(bindings) => bindings,
        Err(err) => {
            error!(error = %err, "Invalid root configuration");
            return Ok(root_status(&err));
        }
    };
    let executor = StageExecutor::new(runner)
        .with_roots(root_bindings)
        .with_variables(variables);
    let config = DriverConfig::new()
        .with_stop_on_failure(args.stop_on_failure)
        .with_max_parallel_subjects(args.jobs);
    let mut driver = PipelineDriver::new(executor)
        .with_config(config)
        .with_cancellation(cancel)
        .with_event_sink(Arc::new(LoggingEventSink::new(Level::DEBUG)));

    let collector = args.report.then(|| {
        Arc::new(ReportCollector::new().with_subject_order(args.subjects.iter().cloned()))
    });
    if let Some(collector) = &collector {
        driver = driver.with_report_collector(collector.clone());
    }

    let report = driver.run_all(pipeline, &args.subjects, &args.runs).await;
    print!("{}", report.outcome_table());

    if let Some(path) = &args.summary_json {
        let json = serde_json::to_string_pretty(&report.to_dict())?;
        tokio::fs::write(path, json).await?;
        info!(path = %path.display(), "Wrote batch summary");
    }

    if let (Some(collector), Some(report_root)) = (&collector, &roots.report_root) {
        write_report(collector, pipeline, report_root).await?;
    }

    Ok(ExitStatus::of_batch(&report))
}

async fn write_report(
    collector: &ReportCollector,
    pipeline: &Pipeline,
    report_root: &Path,
) -> anyhow::Result<()> {
    if collector.is_empty() {
        info!(pipeline = %pipeline.name, "No report fragments collected");
    }
    let document = collector.render(&ReportLayout::default(), &pipeline.name)?;
    let path = report_root.join(format!("{}.md", pipeline.name));
    tokio::fs::write(&path, document).await?;
    info!(path = %path.display(), fragments = collector.len(), "Wrote report");
    Ok(())
}

fn list_command(args: &ListArgs) -> ExitStatus {
    let catalog = match PipelineCatalog::load(args.pipelines.as_deref()) {
        Ok(catalog) => catalog,
        Err(err) => {
            error!(error = %err, "Could not load pipeline definitions");
            return ExitStatus::InvalidDefinition;
        }
    };

    for pipeline in catalog.iter() {
        match &pipeline.description {
            Some(description) => println!("{}  {description}", pipeline.name),
            None => println!("{}", pipeline.name),
        }
        for stage in &pipeline.stages {
            let inputs: Vec<_> = stage.inputs.iter().map(|p| p.name.as_str()).collect();
            let outputs: Vec<_> = stage.outputs.iter().map(|p| p.name.as_str()).collect();
            println!(
                "  {}: [{}] -> [{}]",
                stage.name,
                inputs.join(", "),
                outputs.join(", ")
            );
        }
    }
    ExitStatus::Success
}

fn check_command(args: &CheckArgs) -> ExitStatus {
    let catalog = match PipelineCatalog::load(args.pipelines.as_deref()) {
        Ok(catalog) => catalog,
        Err(err) => {
            error!(error = %err, "Could not load pipeline definitions");
            return ExitStatus::InvalidDefinition;
        }
    };
    let variables = match parse_variables(&args.set) {
        Ok(variables) => variables,
        Err(err) => {
            error!(error = %err, "Invalid pipeline variable");
            return ExitStatus::InvalidDefinition;
        }
    };

    match catalog
        .get(&args.pipeline)
        .and_then(|p| p.validate_with(&variables).map(|()| p))
    {
        Ok(pipeline) => {
            println!(
                "{}: ok ({} stages)",
                pipeline.name,
                pipeline.stages.len()
            );
            ExitStatus::Success
        }
        Err(err) => {
            log_definition_error(&err);
            ExitStatus::InvalidDefinition
        }
    }
}

fn root_status(err: &ConfigError) -> ExitStatus {
    if err.is_missing_root() {
        ExitStatus::MissingRoots
    } else {
        ExitStatus::InvalidDefinition
    }
}

fn log_definition_error(err: &PipelineValidationError) {
    let code = err.code().unwrap_or("PIPELINE-INVALID");
    let hint = err
        .error_info
        .as_ref()
        .and_then(|info| info.fix_hint.as_deref())
        .or_else(|| ContractSuggestions::get(code))
        .unwrap_or("");
    error!(code, stages = ?err.stages, hint, "{}", err.message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingRunner, ScratchLayout};
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    fn run_args(args: &[&str]) -> RunArgs {
        let mut argv = vec!["scanflow", "run"];
        argv.extend_from_slice(args);
        match parse(&argv).command {
            Commands::Run(run) => run,
            other => panic!("expected run, got {other:?}"),
        }
    }

    fn write_definition(dir: &Path) -> PathBuf {
        let path = dir.join("pipelines.json");
        std::fs::write(
            &path,
            r#"{"pipelines": [{
                "name": "mark",
                "stages": [{
                    "name": "mark",
                    "inputs": [{"name": "t1", "template": "{orig_root}/{subject}/t1.nii"}],
                    "outputs": [{"name": "done", "template": "{output_root}/{subject}/done"}],
                    "commands": ["touch {done}"],
                    "report": "mark {subject}: {status}"
                }]
            }]}"#,
        )
        .unwrap();
        path
    }

    #[test]
    fn test_run_arguments() {
        let args = run_args(&[
            "anat",
            "--subjects",
            "sub01,sub02",
            "--set",
            "fwhm=8",
            "--jobs",
            "2",
            "--stop-on-failure",
        ]);

        assert_eq!(args.pipeline, "anat");
        assert_eq!(args.subjects, vec!["sub01", "sub02"]);
        assert_eq!(args.runs, vec!["1"]);
        assert_eq!(args.set, vec!["fwhm=8"]);
        assert_eq!(args.jobs, 2);
        assert!(args.stop_on_failure);
        assert!(!args.report);
    }

    #[test]
    fn test_global_log_options() {
        let cli = parse(&["scanflow", "list", "--log-format", "json", "-l", "debug"]);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_exit_codes() {
        let codes: Vec<u8> = [
            ExitStatus::Success,
            ExitStatus::UnitFailures,
            ExitStatus::MissingRoots,
            ExitStatus::NoSubjects,
            ExitStatus::InvalidDefinition,
            ExitStatus::Cancelled,
        ]
        .into_iter()
        .map(ExitStatus::code)
        .collect();
        assert_eq!(codes, vec![0, 1, 2, 3, 4, 130]);
    }

    #[tokio::test]
    async fn test_no_subjects() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ScratchLayout::create(dir.path()).unwrap();
        let runner = Arc::new(RecordingRunner::new());

        let status = execute_run(
            &run_args(&["anat-preproc"]),
            layout.roots_config(),
            runner.clone(),
            Arc::new(CancellationToken::new()),
        )
        .await
        .unwrap();

        assert_eq!(status, ExitStatus::NoSubjects);
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ScratchLayout::create(dir.path()).unwrap();
        let mut roots = layout.roots_config();
        roots.output_root = None;

        let status = execute_run(
            &run_args(&["anat-preproc", "--subjects", "A"]),
            roots,
            Arc::new(RecordingRunner::new()),
            Arc::new(CancellationToken::new()),
        )
        .await
        .unwrap();

        assert_eq!(status, ExitStatus::MissingRoots);
    }

    #[tokio::test]
    async fn test_non_utf8_root_is_invalid() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let layout = ScratchLayout::create(dir.path()).unwrap();
        let bad = dir.path().join(OsStr::from_bytes(b"orig\xfe"));
        std::fs::create_dir(&bad).unwrap();
        let runner = Arc::new(RecordingRunner::new());

        let status = execute_run(
            &run_args(&["anat-preproc", "--subjects", "A"]),
            layout.roots_config().with_orig_root(bad),
            runner.clone(),
            Arc::new(CancellationToken::new()),
        )
        .await
        .unwrap();

        assert_eq!(status, ExitStatus::InvalidDefinition);
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_reference_root_only_needed_by_registration() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ScratchLayout::create(dir.path()).unwrap();
        let mut roots = layout.roots_config();
        roots.reference_data_root = None;

        let register = execute_run(
            &run_args(&["anat-register", "--subjects", "A"]),
            roots.clone(),
            Arc::new(RecordingRunner::new()),
            Arc::new(CancellationToken::new()),
        )
        .await
        .unwrap();
        let preproc = execute_run(
            &run_args(&["anat-preproc", "--subjects", "A"]),
            roots,
            Arc::new(RecordingRunner::new()),
            Arc::new(CancellationToken::new()),
        )
        .await
        .unwrap();

        assert_eq!(register, ExitStatus::MissingRoots);
        assert_eq!(preproc, ExitStatus::Success);
    }

    #[tokio::test]
    async fn test_unknown_pipeline_and_bad_variable() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ScratchLayout::create(dir.path()).unwrap();

        for argv in [
            vec!["dti", "--subjects", "A"],
            vec!["anat", "--subjects", "A", "--set", "novalue"],
        ] {
            let status = execute_run(
                &run_args(&argv),
                layout.roots_config(),
                Arc::new(RecordingRunner::new()),
                Arc::new(CancellationToken::new()),
            )
            .await
            .unwrap();
            assert_eq!(status, ExitStatus::InvalidDefinition);
        }
    }

    #[tokio::test]
    async fn test_run_writes_report_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ScratchLayout::create(dir.path()).unwrap();
        layout.touch("orig/A/t1.nii").unwrap();
        let definition = write_definition(dir.path());
        let summary = dir.path().join("summary.json");

        let args = run_args(&[
            "mark",
            "--subjects",
            "A,B",
            "--report",
            "--pipelines",
            definition.to_str().unwrap(),
            "--summary-json",
            summary.to_str().unwrap(),
        ]);
        let status = execute_run(
            &args,
            layout.roots_config(),
            Arc::new(ShellCommandRunner::new()),
            Arc::new(CancellationToken::new()),
        )
        .await
        .unwrap();

        assert_eq!(status, ExitStatus::Success);
        assert!(layout.output_root().join("A/done").is_file());

        let document = std::fs::read_to_string(layout.report_root().join("mark.md")).unwrap();
        assert!(document.starts_with("# mark\n\nSubjects: A, B\n"));
        assert!(document.contains("mark A: succeeded"));
        assert!(!document.contains("mark B"));

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(summary).unwrap()).unwrap();
        assert_eq!(json["summary"]["succeeded"], 1);
        assert_eq!(json["summary"]["skipped_missing_inputs"], 1);
    }

    #[tokio::test]
    async fn test_failures_and_cancellation_map_to_exit_status() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ScratchLayout::create(dir.path()).unwrap();
        layout.touch("orig/A/t1.nii").unwrap();
        let definition = write_definition(dir.path());
        let args = run_args(&[
            "mark",
            "--subjects",
            "A",
            "--pipelines",
            definition.to_str().unwrap(),
        ]);

        let failed = execute_run(
            &args,
            layout.roots_config(),
            Arc::new(RecordingRunner::new().fail_on("touch", 1)),
            Arc::new(CancellationToken::new()),
        )
        .await
        .unwrap();

        let token = Arc::new(CancellationToken::new());
        token.cancel("interrupted");
        let cancelled = execute_run(
            &args,
            layout.roots_config(),
            Arc::new(RecordingRunner::new()),
            token,
        )
        .await
        .unwrap();

        assert_eq!(failed, ExitStatus::UnitFailures);
        assert_eq!(cancelled, ExitStatus::Cancelled);
    }
}
