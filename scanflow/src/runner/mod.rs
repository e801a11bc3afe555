//! Execution of single external commands.
//!
//! The [`CommandRunner`] trait is the seam between the stage executor and
//! the outside world; [`ShellCommandRunner`] is the production
//! implementation and `crate::testing` provides recording doubles.

mod shell;

use crate::errors::CommandError;
use async_trait::async_trait;
use std::time::Duration;

pub use shell::ShellCommandRunner;

/// Outcome of a command that exited successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOutcome {
    /// The process exit code (always 0 for a returned outcome).
    pub exit_code: i32,
    /// Wall-clock duration of the process.
    pub elapsed: Duration,
}

impl CommandOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn success(elapsed: Duration) -> Self {
        Self {
            exit_code: 0,
            elapsed,
        }
    }
}

/// Runs one fully resolved external command.
///
/// Implementations must not retry: imaging tools may have partially
/// overwritten their outputs by the time they fail.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Executes `command`, blocking the caller until the process exits.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Failed`] on a non-zero exit and
    /// [`CommandError::Spawn`] if the process could not be started.
    async fn execute(&self, command: &str) -> Result<CommandOutcome, CommandError>;
}
