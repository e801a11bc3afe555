//! # Scanflow
//!
//! A staged, resumable runner for per-subject MRI preprocessing pipelines.
//!
//! A pipeline is an ordered list of stages. Each stage declares path
//! templates for its inputs and outputs and a list of external commands.
//! For every subject and run, scanflow:
//!
//! - **Resolves templates**: `{subject}`, `{run:02}`, the configured roots and
//!   pipeline variables are substituted into paths and commands
//! - **Gates on the filesystem**: a stage is skipped when an input is missing
//!   or when every output already exists
//! - **Runs commands in order**: the first failing command aborts the stage,
//!   scoped cleanup always runs
//! - **Keeps going**: a failed unit is recorded and the batch continues
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scanflow::prelude::*;
//!
//! let pipeline = PipelineBuilder::new("touch")
//!     .stage(
//!         StageSpec::new("mark")
//!             .input("t1", "{orig_root}/{subject}/t1.nii")
//!             .output("done", "{output_root}/{subject}/done")
//!             .command("touch {done}"),
//!     )?
//!     .build()?;
//!
//! let executor = StageExecutor::new(Arc::new(ShellCommandRunner::new()))
//!     .with_roots(RootsConfig::load(None)?.bindings()?);
//! let report = PipelineDriver::new(executor)
//!     .run_all(&pipeline, &subjects, &runs)
//!     .await;
//! print!("{}", report.outcome_table());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod cli;
pub mod config;
pub mod errors;
pub mod events;
pub mod gate;
pub mod observability;
pub mod paths;
pub mod pipeline;
pub mod report;
pub mod runner;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{parse_variables, RootsConfig};
    pub use crate::errors::{
        CommandError, CommandFailedError, ConfigError, ContractErrorInfo,
        PipelineValidationError, ScanflowError, TemplateError, UnboundPlaceholderError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::gate::{ExistenceGate, GateDecision};
    pub use crate::paths::{resolve, Bindings, Template};
    pub use crate::pipeline::{
        BatchReport, BatchSummary, DriverConfig, Pipeline, PipelineBuilder, PipelineCatalog,
        PipelineDriver,
    };
    pub use crate::report::{ReportCollector, ReportLayout};
    pub use crate::runner::{CommandOutcome, CommandRunner, ShellCommandRunner};
    pub use crate::stages::{CommandStep, ExecutionResult, StageExecutor, StageSpec, UnitReport};
    pub use std::sync::Arc;
}
