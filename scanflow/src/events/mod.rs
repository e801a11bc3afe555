//! Batch events for observability.
//!
//! The driver reports every unit and the end of the batch to an
//! [`EventSink`]. Sinks are passed in explicitly; there is no global sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A unit is about to go through the gate.
pub const UNIT_STARTED: &str = "unit.started";
/// A unit ran its commands successfully.
pub const UNIT_COMPLETED: &str = "unit.completed";
/// A unit was skipped (missing inputs or existing outputs).
pub const UNIT_SKIPPED: &str = "unit.skipped";
/// A unit failed.
pub const UNIT_FAILED: &str = "unit.failed";
/// The batch finished (possibly stopped early).
pub const BATCH_COMPLETED: &str = "batch.completed";
/// The batch was cancelled before every unit ran.
pub const BATCH_CANCELLED: &str = "batch.cancelled";
