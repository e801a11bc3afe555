//! Path and command templating.
//!
//! Every input, output, work directory, command and cleanup entry of a stage
//! is a [`Template`] resolved against a [`Bindings`] map for one unit.

mod bindings;
mod template;

pub use bindings::{Bindings, RUN, STATUS, SUBJECT};
pub use template::{resolve, Template};
