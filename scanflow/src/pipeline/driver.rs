//! Batch execution over subjects, runs and stages.

use super::summary::{BatchReport, BatchSummary};
use super::Pipeline;
use crate::cancellation::CancellationToken;
use crate::events::{
    EventSink, NoOpEventSink, BATCH_CANCELLED, BATCH_COMPLETED, UNIT_COMPLETED, UNIT_FAILED,
    UNIT_SKIPPED, UNIT_STARTED,
};
use crate::observability::SpanTimer;
use crate::report::ReportCollector;
use crate::stages::{ExecutionResult, StageExecutor, UnitReport};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// How a batch reacts to failures and how many subjects run at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverConfig {
    /// End the batch after the first failed unit.
    #[serde(default)]
    pub stop_on_failure: bool,
    /// Subjects processed concurrently. Stages of one subject stay sequential.
    #[serde(default = "default_parallel")]
    pub max_parallel_subjects: usize,
}

fn default_parallel() -> usize {
    1
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            stop_on_failure: false,
            max_parallel_subjects: default_parallel(),
        }
    }
}

impl DriverConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the batch stops at the first failure.
    #[must_use]
    pub fn with_stop_on_failure(mut self, stop: bool) -> Self {
        self.stop_on_failure = stop;
        self
    }

    /// Sets the number of subjects processed concurrently (at least 1).
    #[must_use]
    pub fn with_max_parallel_subjects(mut self, n: usize) -> Self {
        self.max_parallel_subjects = n.max(1);
        self
    }
}

/// Runs every stage of a pipeline for every (subject, run).
///
/// Subjects are taken in caller order, runs in caller order and stages in
/// declared order. A failed unit never stops other (subject, run) pairs
/// unless `stop_on_failure` is set; later stages of the same pair still go
/// through the existence gate.
pub struct PipelineDriver {
    executor: Arc<StageExecutor>,
    config: DriverConfig,
    cancel: Arc<CancellationToken>,
    events: Arc<dyn EventSink>,
    report: Option<Arc<ReportCollector>>,
}

impl fmt::Debug for PipelineDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineDriver")
            .field("executor", &self.executor)
            .field("config", &self.config)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl PipelineDriver {
    /// Creates a driver with the default configuration.
    #[must_use]
    pub fn new(executor: StageExecutor) -> Self {
        Self {
            executor: Arc::new(executor),
            config: DriverConfig::default(),
            cancel: Arc::new(CancellationToken::new()),
            events: Arc::new(NoOpEventSink),
            report: None,
        }
    }

    /// Sets the driver configuration.
    #[must_use]
    pub fn with_config(mut self, config: DriverConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares a cancellation token, e.g. with a Ctrl-C handler.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancel = token;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Collects report fragments into `collector`.
    #[must_use]
    pub fn with_report_collector(mut self, collector: Arc<ReportCollector>) -> Self {
        self.report = Some(collector);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        self.cancel.clone()
    }

    /// Runs the whole batch.
    pub async fn run_all(
        &self,
        pipeline: &Pipeline,
        subjects: &[String],
        runs: &[String],
    ) -> BatchReport {
        let batch_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let timer = SpanTimer::start(&batch_id);
        info!(
            batch_id = %batch_id,
            pipeline = %pipeline.name,
            subjects = subjects.len(),
            runs = runs.len(),
            stages = pipeline.stages.len(),
            "Starting batch"
        );

        // halt: stop_on_failure tripped; interrupted: a unit was held back by cancellation
        let halt = CancellationToken::new();
        let interrupted = CancellationToken::new();
        let jobs = self.config.max_parallel_subjects.max(1);

        // buffered keeps results in subject order whatever finishes first
        let per_subject: Vec<Vec<UnitReport>> = stream::iter(subjects)
            .map(|subject| self.run_subject(pipeline, subject, runs, &halt, &interrupted))
            .buffered(jobs)
            .collect()
            .await;

        let units: Vec<UnitReport> = per_subject.into_iter().flatten().collect();
        let summary = BatchSummary::from_units(&units);
        // a cancel that arrives after the last unit started holds nothing back
        let cancelled = interrupted.reason();
        let duration_ms = timer.finish().as_secs_f64() * 1000.0;

        let data = json!({
            "batch_id": batch_id,
            "pipeline": pipeline.name,
            "summary": summary,
            "duration_ms": duration_ms,
        });
        if let Some(reason) = &cancelled {
            warn!(batch_id = %batch_id, reason = %reason, "Batch cancelled");
            self.events.emit(BATCH_CANCELLED, Some(data)).await;
        } else {
            info!(batch_id = %batch_id, duration_ms, summary = %summary.line(), "Batch finished");
            self.events.emit(BATCH_COMPLETED, Some(data)).await;
        }

        BatchReport {
            batch_id,
            pipeline: pipeline.name.clone(),
            started_at,
            duration_ms,
            units,
            summary,
            cancelled,
            stopped_early: halt.is_cancelled(),
        }
    }

    async fn run_subject(
        &self,
        pipeline: &Pipeline,
        subject: &str,
        runs: &[String],
        halt: &CancellationToken,
        interrupted: &CancellationToken,
    ) -> Vec<UnitReport> {
        let mut units = Vec::with_capacity(runs.len() * pipeline.stages.len());
        info!(subject, "Processing subject");

        for run in runs {
            for stage in &pipeline.stages {
                if self.cancel.is_cancelled() {
                    let reason = self.cancel.reason().unwrap_or_else(|| "cancelled".to_string());
                    info!(subject, run = %run, stage = %stage.name, "Cancelled before unit started");
                    interrupted.cancel(reason);
                    return units;
                }
                if halt.is_cancelled() {
                    return units;
                }

                self.events
                    .emit(
                        UNIT_STARTED,
                        Some(json!({ "subject": subject, "run": run, "stage": stage.name })),
                    )
                    .await;

                let report = self.executor.run(stage, subject, run).await;
                self.publish(&report).await;

                if report.result.is_failure() && self.config.stop_on_failure {
                    halt.cancel(format!("unit {} failed", report.key));
                }
                units.push(report);
            }
        }

        units
    }

    async fn publish(&self, report: &UnitReport) {
        let event = match &report.result {
            ExecutionResult::Succeeded => UNIT_COMPLETED,
            ExecutionResult::Failed(_) => UNIT_FAILED,
            ExecutionResult::SkippedMissingInputs { .. } | ExecutionResult::SkippedOutputsExist => {
                UNIT_SKIPPED
            }
        };
        let data = serde_json::to_value(report).ok();
        self.events.emit(event, data).await;

        if let (Some(collector), Some(fragment)) = (&self.report, &report.fragment) {
            collector.append(
                &report.key.subject,
                &report.key.run,
                &report.key.stage,
                fragment,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DriverConfig::default();
        assert!(!config.stop_on_failure);
        assert_eq!(config.max_parallel_subjects, 1);
        assert_eq!(DriverConfig::new().with_max_parallel_subjects(0).max_parallel_subjects, 1);
    }

    #[test]
    fn test_config_deserialize() {
        let config: DriverConfig = serde_json::from_str(r#"{"stopOnFailure": true}"#).unwrap();
        assert!(config.stop_on_failure);
        assert_eq!(config.max_parallel_subjects, 1);
    }
}
