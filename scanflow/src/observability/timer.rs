//! Wall-clock timing for commands and units.

use std::time::{Duration, Instant};
use tracing::trace;

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time so far.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns its duration.
    #[must_use]
    pub fn finish(self) -> Duration {
        let elapsed = self.elapsed();
        trace!(span = %self.name, duration_ms = elapsed.as_secs_f64() * 1000.0, "Span finished");
        elapsed
    }
}
