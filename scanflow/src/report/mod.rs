//! Per-unit report fragments and the document assembled from them.

mod collector;
mod layout;

pub use collector::{ReportCollector, ReportEntry};
pub use layout::{ReportLayout, DEFAULT_LAYOUT};
