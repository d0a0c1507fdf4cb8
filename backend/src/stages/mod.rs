//! Processing stages.
//!
//! A stage consumes one [`Record`] and yields zero (filter), one
//! (transform) or several (split) records, or fails. Terminal stages such as
//! [`sql::SqlOutputStage`] are invoked for their side effect only; whatever
//! they return is discarded.
//!
//! Stages are built per batch by the [`registry::StageRegistry`] from the
//! configured [`StageSpec`] list and borrow the batch's [`StageResources`],
//! so they cannot outlive the batch that created them.

pub mod experts;
pub mod registry;
pub mod sql;

pub use registry::{StageConstructor, StageRegistry};
pub use sql::{BatchStore, SqlOutputStage};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StageResult;
use crate::models::Record;
use crate::validation::Harmonization;

/// One unit of the processing chain.
pub trait Stage {
    /// Identifier from the configuration, used in logs and error messages.
    fn id(&self) -> &str;

    /// Process one record.
    fn process(&mut self, record: Record) -> StageResult<Vec<Record>>;

    /// Terminal stages never contribute records to the next stage.
    fn is_terminal(&self) -> bool {
        false
    }
}

/// Configuration of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl StageSpec {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            parameters: Map::new(),
        }
    }

    pub fn with_parameter(mut self, name: &str, value: Value) -> Self {
        self.parameters.insert(name.to_string(), value);
        self
    }
}

/// Batch-scoped resources handed to stage constructors.
#[derive(Clone, Copy)]
pub struct StageResources<'r> {
    pub schema: &'r Harmonization,
    /// The batch's open transaction, if a database is configured.
    pub database: Option<&'r Connection>,
}

impl<'r> StageResources<'r> {
    pub fn new(schema: &'r Harmonization) -> Self {
        Self {
            schema,
            database: None,
        }
    }

    pub fn with_database(mut self, database: &'r Connection) -> Self {
        self.database = Some(database);
        self
    }
}
