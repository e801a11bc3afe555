//! Pipeline definition and batch execution.
//!
//! This module provides:
//! - Pipeline specifications and a builder
//! - The built-in catalog and JSON pipeline definitions
//! - The batch driver and its summary types

mod builder;
pub mod builtin;
mod catalog;
mod driver;
mod spec;
mod summary;


pub use builder::PipelineBuilder;
pub use catalog::{PipelineCatalog, PipelineDefinition};
pub use driver::{DriverConfig, PipelineDriver};
pub use spec::{known_names, Pipeline};
pub use summary::{BatchReport, BatchSummary, FailureRecord};
