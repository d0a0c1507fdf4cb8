//! # Webinput - row-to-record conversion and processing pipeline
//!
//! Webinput takes tabular input (CSV or JSON rows), turns each row into a
//! sanitized, schema-validated event record, runs the record through a
//! configurable chain of stages and forwards accepted records to a
//! destination queue, reporting every line's outcome.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │    Rows     │────▶│   Record    │────▶│   Stages    │────▶│ Submission  │────▶│ Destination │
//! │ (CSV/JSON)  │     │   Builder   │     │ (fan-out)   │     │    Gate     │     │    Queue    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                            │                   │                   │
//!                            └───────────────────┴───────────────────┴──▶ Line Accountant → Report
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use webinput::{run_batch, AppConfig, BatchContext, BatchRequest, MemoryQueue, StageRegistry};
//!
//! let config = AppConfig::from_env(None)?;
//! let schema = config.harmonization()?;
//! let registry = StageRegistry::new();
//! let context = BatchContext::new(&config, &schema, &registry);
//!
//! let rows = webinput::parser::read_rows_file("events.csv", None)?;
//! let report = run_batch(&context, &BatchRequest::new(rows), &mut MemoryQueue::new())?;
//! println!("{} of {} lines invalid", report.input_lines_invalid, report.input_lines);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Row, Record, FieldError
//! - [`validation`] - Harmonization, field types, taxonomy, JSON Schema
//! - [`transform`] - Field sanitizer, record builder, pipeline runner
//! - [`stages`] - Stage trait, registry and built-in stages
//! - [`batch`] - Batch orchestration, submission gate, line accounting
//! - [`queue`] - Destination queues
//! - [`config`] - Application configuration
//! - [`parser`] - CSV and JSON input
//! - [`api`] - HTTP API server and logging

// Core modules
pub mod error;
pub mod models;

// Validation
pub mod validation;

// Transformation
pub mod stages;
pub mod transform;

// Batch processing
pub mod batch;
pub mod queue;

// Configuration and input
pub mod config;
pub mod parser;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    BatchError, ConfigError, CsvError, QueueError, RegistryError, SanitizeError, SchemaError,
    ServerError, StageError, StoreError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{FieldError, Record, Row, LINE_ERROR_KEY};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{is_valid, validate, FieldType, Harmonization};

// =============================================================================
// Re-exports - Transform and stages
// =============================================================================

pub use stages::{Stage, StageRegistry, StageResources, StageSpec};
pub use transform::{BuildOptions, LineOutcome, RecordBuilder};

// =============================================================================
// Re-exports - Batch
// =============================================================================

pub use batch::{
    preview, preview_at, run_batch, run_batch_at, BatchContext, BatchRequest, PreviewResult,
    Report,
};
pub use queue::{Destination, DestinationConfig, MemoryQueue};

// =============================================================================
// Re-exports - Configuration and input
// =============================================================================

pub use config::{AppConfig, FieldDefaults};
pub use parser::{detect_delimiter, parse_csv, parse_json_rows, read_rows_file};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{error_response, UploadRequest, UploadResponse};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server, AppState};
}
