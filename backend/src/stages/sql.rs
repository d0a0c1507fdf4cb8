//! SQL output: a terminal stage writing records into a table of the batch's
//! shared transaction.
//!
//! The transaction spans the whole batch. It is rolled back for dry runs and
//! committed otherwise; if the batch aborts, dropping it rolls back.

use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, Transaction};
use serde_json::Value;
use std::path::Path;

use super::registry::Parameters;
use super::{Stage, StageResources, StageSpec};
use crate::error::{RegistryError, RegistryResult, StageResult, StoreError, StoreResult};
use crate::models::Record;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid"));

const DEFAULT_TABLE: &str = "events";

/// Owner of the database connection used for batch transactions.
pub struct BatchStore {
    connection: Connection,
}

impl BatchStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let connection = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self { connection })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let connection = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: ":memory:".to_string(),
            source,
        })?;
        Ok(Self { connection })
    }

    /// Direct access, e.g. for creating tables.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Start the batch transaction.
    pub fn begin(&mut self) -> StoreResult<Transaction<'_>> {
        Ok(self.connection.transaction()?)
    }
}

/// End the batch transaction: roll back for dry runs, commit otherwise.
pub fn finish(transaction: Transaction<'_>, dryrun: bool) -> StoreResult<()> {
    if dryrun {
        transaction.rollback()?;
    } else {
        transaction.commit()?;
    }
    Ok(())
}

/// Inserts each record as one row of `table`.
pub struct SqlOutputStage<'r> {
    id: String,
    connection: &'r Connection,
    table: String,
    /// Columns to write; all record fields when unset.
    fields: Option<Vec<String>>,
}

pub fn sql_output_stage<'r>(
    spec: &StageSpec,
    resources: &StageResources<'r>,
) -> RegistryResult<Box<dyn Stage + 'r>> {
    let connection = resources
        .database
        .ok_or_else(|| RegistryError::MissingResource {
            id: spec.id.clone(),
            resource: "a database".to_string(),
        })?;
    let params = Parameters::of(spec);
    let table = params.optional_string("table")?.unwrap_or(DEFAULT_TABLE);
    if !IDENTIFIER_RE.is_match(table) {
        return Err(params.invalid("table", format!("'{}' is not a plain identifier", table)));
    }
    Ok(Box::new(SqlOutputStage {
        id: spec.id.clone(),
        connection,
        table: table.to_string(),
        fields: params.optional_string_list("fields")?,
    }))
}

impl Stage for SqlOutputStage<'_> {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_terminal(&self) -> bool {
        true
    }

    fn process(&mut self, record: Record) -> StageResult<Vec<Record>> {
        let (columns, values): (Vec<String>, Vec<SqlValue>) = record
            .iter()
            .filter(|(key, _)| match &self.fields {
                Some(fields) => fields.iter().any(|f| f == key),
                None => true,
            })
            .map(|(key, value)| (quote_identifier(key), to_sql(value)))
            .unzip();
        if columns.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let statement = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders
        );
        self.connection
            .execute(&statement, params_from_iter(values))?;
        Ok(Vec::new())
    }
}

/// Field names contain dots, so columns are always quoted.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
