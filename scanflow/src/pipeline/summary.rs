//! Batch outcome accounting.

use crate::stages::{ExecutionResult, UnitKey, UnitReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Record of one failed unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// The failed unit.
    pub unit: UnitKey,
    /// Error message.
    pub error: String,
    /// The failing command line, when a command was involved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Exit status of the failing command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
}

/// Outcome counts for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Units attempted.
    pub total: usize,
    /// Units whose commands all succeeded.
    pub succeeded: usize,
    /// Units skipped because inputs were missing.
    pub skipped_missing_inputs: usize,
    /// Units skipped because outputs already existed.
    pub skipped_outputs_exist: usize,
    /// Units that failed.
    pub failed: usize,
    /// Detail for every failed unit, in execution order.
    pub failures: Vec<FailureRecord>,
}

impl BatchSummary {
    /// Tallies a sequence of unit reports.
    #[must_use]
    pub fn from_units(units: &[UnitReport]) -> Self {
        let mut summary = Self::default();
        for unit in units {
            summary.record(unit);
        }
        summary
    }

    /// Adds one unit to the counts.
    pub fn record(&mut self, unit: &UnitReport) {
        self.total += 1;
        match &unit.result {
            ExecutionResult::Succeeded => self.succeeded += 1,
            ExecutionResult::SkippedMissingInputs { .. } => self.skipped_missing_inputs += 1,
            ExecutionResult::SkippedOutputsExist => self.skipped_outputs_exist += 1,
            ExecutionResult::Failed(failure) => {
                self.failed += 1;
                self.failures.push(FailureRecord {
                    unit: unit.key.clone(),
                    error: failure.to_string(),
                    command: failure.command().map(str::to_string),
                    exit_status: failure.exit_status(),
                });
            }
        }
    }

    /// Units skipped for either reason.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped_missing_inputs + self.skipped_outputs_exist
    }

    /// Returns true if any unit failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// One-line summary, e.g. `4 units: 2 succeeded / 1 skipped / 1 failed`.
    #[must_use]
    pub fn line(&self) -> String {
        format!(
            "{} units: {} succeeded / {} skipped / {} failed",
            self.total,
            self.succeeded,
            self.skipped(),
            self.failed
        )
    }
}

/// Everything produced by one `run_all`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Unique batch identifier.
    pub batch_id: String,
    /// Pipeline name.
    pub pipeline: String,
    /// When the batch started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration.
    pub duration_ms: f64,
    /// Unit reports in subject, run, stage order.
    pub units: Vec<UnitReport>,
    /// Outcome counts.
    pub summary: BatchSummary,
    /// Cancellation reason, if the batch was cancelled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<String>,
    /// True if `stop_on_failure` ended the batch early.
    pub stopped_early: bool,
}

impl BatchReport {
    /// Returns true if the batch was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_some()
    }

    /// Returns the report for one unit.
    #[must_use]
    pub fn unit(&self, subject: &str, run: &str, stage: &str) -> Option<&UnitReport> {
        self.units
            .iter()
            .find(|u| u.key.subject == subject && u.key.run == run && u.key.stage == stage)
    }

    /// Renders the per-unit outcome table, the summary line and failure detail.
    #[must_use]
    pub fn outcome_table(&self) -> String {
        let column = |header: &str, field: fn(&UnitKey) -> usize| {
            self.units
                .iter()
                .map(|u| field(&u.key))
                .fold(header.len(), usize::max)
        };
        let subject_w = column("SUBJECT", |k| k.subject.len());
        let run_w = column("RUN", |k| k.run.len());
        let stage_w = column("STAGE", |k| k.stage.len());

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:subject_w$}  {:run_w$}  {:stage_w$}  OUTCOME",
            "SUBJECT", "RUN", "STAGE"
        );
        for unit in &self.units {
            let _ = writeln!(
                out,
                "{:subject_w$}  {:run_w$}  {:stage_w$}  {}",
                unit.key.subject,
                unit.key.run,
                unit.key.stage,
                unit.result.label()
            );
        }

        let _ = writeln!(out, "\n{}", self.summary.line());
        if let Some(reason) = &self.cancelled {
            let _ = writeln!(out, "Batch cancelled: {reason}");
        }
        if self.stopped_early {
            let _ = writeln!(out, "Batch stopped after the first failure");
        }
        for failure in &self.summary.failures {
            let _ = writeln!(out, "\nFAILED {}: {}", failure.unit, failure.error);
            if let Some(command) = &failure.command {
                let _ = writeln!(out, "  command: {command}");
            }
            if let Some(status) = failure.exit_status {
                let _ = writeln!(out, "  exit status: {status}");
            }
        }
        out
    }

    /// Converts to a JSON object.
    #[must_use]
    pub fn to_dict(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CommandFailedError;
    use crate::stages::StageFailure;
    use pretty_assertions::assert_eq;

    fn unit(subject: &str, stage: &str, result: ExecutionResult) -> UnitReport {
        UnitReport {
            key: UnitKey::new(subject, "1", stage),
            result,
            started_at: Utc::now(),
            duration_ms: 1.0,
            commands_issued: 0,
            fragment: None,
        }
    }

    fn sample() -> Vec<UnitReport> {
        vec![
            unit(
                "A",
                "skullstrip",
                ExecutionResult::Failed(StageFailure::Command(CommandFailedError::new(
                    "bet a b",
                    Some(1),
                ))),
            ),
            unit(
                "A",
                "segment",
                ExecutionResult::SkippedMissingInputs { missing: vec![] },
            ),
            unit("B", "skullstrip", ExecutionResult::Succeeded),
            unit("B", "segment", ExecutionResult::SkippedOutputsExist),
        ]
    }

    #[test]
    fn test_summary_counts() {
        let summary = BatchSummary::from_units(&sample());

        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.skipped(), 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(
            summary.failures,
            vec![FailureRecord {
                unit: UnitKey::new("A", "1", "skullstrip"),
                error: "Command failed with exit status 1: bet a b".into(),
                command: Some("bet a b".into()),
                exit_status: Some(1),
            }]
        );
        assert_eq!(summary.line(), "4 units: 1 succeeded / 2 skipped / 1 failed");
    }

    #[test]
    fn test_outcome_table() {
        let units = sample();
        let report = BatchReport {
            batch_id: "b".into(),
            pipeline: "anat".into(),
            started_at: Utc::now(),
            duration_ms: 4.0,
            summary: BatchSummary::from_units(&units),
            units,
            cancelled: None,
            stopped_early: false,
        };

        let table = report.outcome_table();
        let lines: Vec<_> = table.lines().collect();

        assert_eq!(lines[0], "SUBJECT  RUN  STAGE       OUTCOME");
        assert_eq!(lines[1], "A        1    skullstrip  failed");
        assert!(table.contains("FAILED A/1/skullstrip"));
        assert!(table.contains("  exit status: 1"));
        assert!(report.unit("B", "1", "segment").is_some());
    }
}
