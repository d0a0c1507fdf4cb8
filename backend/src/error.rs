//! Error types for the webinput record pipeline.
//!
//! Errors are split by how far they propagate:
//!
//! - [`SanitizeError`] - one value rejected for one field; recovered per line
//! - [`StageError`] - one stage invocation failed; recovered per record
//! - [`RegistryError`] - a configured stage could not be constructed; batch-fatal
//! - [`StoreError`] - the shared SQL transaction failed; batch-fatal
//! - [`QueueError`] - the destination queue refused a record; batch-fatal
//! - [`BatchError`] - top-level error of a batch run, no report is produced
//! - [`ConfigError`], [`SchemaError`], [`CsvError`] - loading configuration and input
//! - [`ServerError`] - HTTP layer
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Field-level Errors
// =============================================================================

/// A value that could not be stored under a field name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    /// Field name is not part of the harmonization or not on the allow-list.
    #[error("field '{0}' is not allowed")]
    UnknownField(String),

    /// Value is malformed for the field's type.
    #[error("invalid value '{value}' for key '{key}'")]
    InvalidValue { key: String, value: String },

    /// Time value could not be parsed, even with the timezone fallback.
    #[error("could not parse '{value}' as a timestamp for key '{key}'")]
    InvalidTime { key: String, value: String },

    /// Timezone fallback itself is malformed.
    #[error("invalid timezone '{0}'")]
    InvalidTimezone(String),

    /// Field is already present and may not be overwritten.
    #[error("key '{0}' already exists")]
    KeyExists(String),
}

// =============================================================================
// Stage Errors
// =============================================================================

/// Failure of one stage invocation on one record.
#[derive(Debug, Error)]
pub enum StageError {
    /// The stage rejected the record.
    #[error("{0}")]
    Failed(String),

    /// The stage tried to store an invalid value.
    #[error(transparent)]
    Sanitize(#[from] SanitizeError),

    /// The shared database refused a statement.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl StageError {
    /// Create a failure with a free-form message.
    pub fn failed(message: impl Into<String>) -> Self {
        StageError::Failed(message.into())
    }
}

/// A configured stage could not be constructed.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No constructor registered for this kind.
    #[error("unknown stage kind '{kind}' for stage '{id}'")]
    UnknownKind { id: String, kind: String },

    /// A parameter is missing or has the wrong shape.
    #[error("invalid parameter '{parameter}' for stage '{id}': {message}")]
    InvalidParameter {
        id: String,
        parameter: String,
        message: String,
    },

    /// The stage needs a resource the batch does not provide.
    #[error("stage '{id}' requires {resource}, which is not configured")]
    MissingResource { id: String, resource: String },
}

// =============================================================================
// Resource Errors
// =============================================================================

/// Errors from the batch-scoped SQL transaction.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening the database failed.
    #[error("failed to open database '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Begin, commit or rollback failed.
    #[error("transaction error: {0}")]
    Transaction(#[from] rusqlite::Error),
}

/// Errors from the destination queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Writing to a spool file failed.
    #[error("queue IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP delivery failed.
    #[error("queue HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("queue endpoint '{url}' answered {status}")]
    Rejected { url: String, status: u16 },
}

// =============================================================================
// Configuration and Input Errors
// =============================================================================

/// Errors while loading the harmonization (field schema).
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Failed to read file.
    #[error("failed to read harmonization: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid JSON or has the wrong shape.
    #[error("invalid harmonization: {0}")]
    Json(#[from] serde_json::Error),

    /// The `event` section is missing.
    #[error("harmonization has no 'event' section")]
    MissingEventSection,
}

/// Errors while loading the application configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read file.
    #[error("failed to read configuration '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// File is not valid JSON or does not deserialize.
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// File violates the configuration schema.
    #[error("configuration failed validation: {}", .0.join("; "))]
    Invalid(Vec<String>),

    /// Harmonization referenced by the configuration failed to load.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Errors while reading CSV input.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid CSV format.
    #[error("invalid CSV format: {0}")]
    Parse(#[from] csv::Error),

    /// Input is neither a JSON array of objects nor CSV.
    #[error("invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),

    /// Input has the right syntax but the wrong shape.
    #[error("invalid input: {0}")]
    Shape(String),

    /// No headers found.
    #[error("no headers found in CSV")]
    NoHeaders,
}

// =============================================================================
// Batch Errors (top-level)
// =============================================================================

/// Errors that abort a whole batch.
///
/// Field-, line- and stage-invocation failures never surface here; they are
/// accounted in the report instead.
#[derive(Debug, Error)]
pub enum BatchError {
    /// A configured stage could not be constructed.
    #[error("stage construction failed: {0}")]
    Registry(#[from] RegistryError),

    /// The shared transaction failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Sending to the destination queue failed.
    #[error("destination error: {0}")]
    Queue(#[from] QueueError),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Missing or wrong credentials for a submission.
    #[error("unauthorized")]
    Unauthorized,

    /// Invalid request.
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// The batch was aborted.
    #[error("batch failed: {0}")]
    Batch(#[from] BatchError),

    /// Server internal error.
    #[error("internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for harmonization loading.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Result type for CSV input.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for stage construction.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for one stage invocation.
pub type StageResult<T> = Result<T, StageError>;

/// Result type for the SQL transaction.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Result type for batch runs.
pub type BatchResult<T> = Result<T, BatchError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
