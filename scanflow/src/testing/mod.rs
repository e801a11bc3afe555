//! Test doubles and fixtures for scanflow pipelines.
//!
//! This module provides:
//! - A recording command runner with configurable failures
//! - Scratch directory layouts for the configured roots
//! - A small `touch`-based pipeline

mod fixtures;
mod mocks;

pub use fixtures::{touch_pipeline, ScratchLayout};
pub use mocks::RecordingRunner;
