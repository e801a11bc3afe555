//! Stages: declared paths, commands and cleanup for one processing step.
//!
//! A [`StageSpec`] is pure data. The [`StageExecutor`] resolves it for a
//! (subject, run), consults the existence gate, runs its commands and
//! produces a [`UnitReport`].

mod cleanup;
mod executor;
mod result;
mod spec;

pub use cleanup::{CleanupReport, CleanupScope};
pub use executor::StageExecutor;
pub use result::{ExecutionResult, StageFailure, UnitKey, UnitReport};
pub use spec::{CommandStep, NamedPath, ResolvedStage, ResolvedStep, StageSpec};
