//! Transformation module.
//!
//! This module turns raw rows into records and records into stage output:
//! - Sanitizer: one raw cell to one stored value
//! - Builder: one row to one record
//! - Pipeline: one record through the stage chain

pub mod builder;
pub mod pipeline;
pub mod sanitizer;

pub use builder::{BuildOptions, BuildOutcome, RecordBuilder};
pub use pipeline::{run, LineOutcome};
pub use sanitizer::{sanitize, SanitizeContext};
