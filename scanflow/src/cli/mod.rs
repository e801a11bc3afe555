//! Command-line interface for scanflow.
//!
//! Provides commands to run a pipeline over a batch of subjects, list the
//! known pipelines and check a pipeline definition without running it.

mod commands;

pub use commands::{
    execute_run, parse_cli, run_with_cli, CheckArgs, Cli, Commands, ExitStatus, ListArgs,
    LogFormat, RunArgs,
};
