//! Command runner doubles.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{CommandError, CommandFailedError};
use crate::runner::{CommandOutcome, CommandRunner};

type Hook = Arc<dyn Fn(&str) + Send + Sync>;

/// A runner that records every command instead of executing it.
///
/// Commands containing a configured substring fail with the given exit
/// status; everything else succeeds.
#[derive(Default)]
pub struct RecordingRunner {
    commands: Mutex<Vec<String>>,
    failures: Vec<(String, i32)>,
    delay: Option<Duration>,
    hook: Option<Hook>,
}

impl fmt::Debug for RecordingRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingRunner")
            .field("commands", &self.commands.lock().len())
            .field("failures", &self.failures)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl RecordingRunner {
    /// Creates a runner where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails any command containing `needle` with `exit_status`.
    #[must_use]
    pub fn fail_on(mut self, needle: impl Into<String>, exit_status: i32) -> Self {
        self.failures.push((needle.into(), exit_status));
        self
    }

    /// Sleeps before each command completes.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Calls `hook` with each command as it is recorded.
    #[must_use]
    pub fn with_hook(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Returns the recorded commands in issue order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    /// Returns the number of commands issued.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.commands.lock().len()
    }

    /// Returns the recorded commands containing `needle`.
    #[must_use]
    pub fn commands_matching(&self, needle: &str) -> Vec<String> {
        self.commands
            .lock()
            .iter()
            .filter(|c| c.contains(needle))
            .cloned()
            .collect()
    }

    /// Clears the recorded commands.
    pub fn reset(&self) {
        self.commands.lock().clear();
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn execute(&self, command: &str) -> Result<CommandOutcome, CommandError> {
        self.commands.lock().push(command.to_string());
        if let Some(hook) = &self.hook {
            hook(command);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.failures.iter().find(|(needle, _)| command.contains(needle)) {
            Some((_, status)) => Err(CommandFailedError::new(command, Some(*status)).into()),
            None => Ok(CommandOutcome::success(self.delay.unwrap_or_default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_records_commands() {
        let runner = RecordingRunner::new();
        runner.execute("bet a b").await.unwrap();
        runner.execute("fast b").await.unwrap();

        assert_eq!(runner.commands(), vec!["bet a b", "fast b"]);
        assert_eq!(runner.commands_matching("fast").len(), 1);

        runner.reset();
        assert_eq!(runner.call_count(), 0);
    }

    #[tokio::test]
    async fn test_configured_failure() {
        let runner = RecordingRunner::new().fail_on("flirt", 2);
        let err = runner.execute("flirt -in x").await.unwrap_err();

        assert_eq!(
            err,
            CommandError::Failed(CommandFailedError::new("flirt -in x", Some(2)))
        );
        assert_eq!(runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_hook_sees_each_command() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let runner = RecordingRunner::new().with_hook(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        runner.execute("true").await.unwrap();
        runner.execute("true").await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
