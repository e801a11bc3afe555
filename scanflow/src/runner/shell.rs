//! Shell-backed command runner.

use super::{CommandOutcome, CommandRunner};
use crate::errors::{CommandError, CommandFailedError};
use crate::observability::SpanTimer;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{error, info};

/// Runs commands through `sh -c`, streaming their output to the terminal.
#[derive(Debug, Clone)]
pub struct ShellCommandRunner {
    shell: String,
}

impl Default for ShellCommandRunner {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl ShellCommandRunner {
    /// Creates a runner using `sh`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a different shell binary (it must accept `-c <command>`).
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Returns the shell binary.
    #[must_use]
    pub fn shell(&self) -> &str {
        &self.shell
    }
}

fn echo(command: &str) {
    let mut words = command.split_whitespace();
    let program = words.next().unwrap_or_default();
    let args = words.collect::<Vec<_>>().join(" ");
    info!(program, args = %args, "Running command");
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn execute(&self, command: &str) -> Result<CommandOutcome, CommandError> {
        echo(command);
        let timer = SpanTimer::start(command);

        // stdout and stderr are inherited so long-running tools show progress
        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .status()
            .await
            .map_err(|e| CommandError::spawn(command, e.to_string()))?;

        let elapsed = timer.finish();
        let duration_ms = elapsed.as_secs_f64() * 1000.0;

        if status.success() {
            info!(duration_ms, "Command finished");
            Ok(CommandOutcome::success(elapsed))
        } else {
            error!(duration_ms, exit_status = ?status.code(), command, "Command failed");
            Err(CommandFailedError::new(command, status.code()).into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command() {
        let runner = ShellCommandRunner::new();
        let outcome = runner.execute("true").await.unwrap();
        assert_eq!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn test_failing_command_reports_status() {
        let runner = ShellCommandRunner::new();
        let err = runner.execute("exit 3").await.unwrap_err();

        assert_eq!(
            err,
            CommandError::Failed(CommandFailedError::new("exit 3", Some(3)))
        );
    }

    #[tokio::test]
    async fn test_command_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("brain.nii");
        let runner = ShellCommandRunner::new();

        runner
            .execute(&format!("touch {}", target.display()))
            .await
            .unwrap();

        assert!(target.exists());
    }

    #[tokio::test]
    async fn test_missing_shell_is_spawn_error() {
        let runner = ShellCommandRunner::new().with_shell("/definitely/not/a/shell");
        let err = runner.execute("true").await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }
}
