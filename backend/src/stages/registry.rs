//! Stage registry: stage kind to constructor.
//!
//! Built-in kinds are registered by [`StageRegistry::new`]; embedders add
//! their own with [`StageRegistry::register`]. Construction happens once at
//! batch start and any failure aborts the batch before the first line.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::{experts, sql, Stage, StageResources, StageSpec};
use crate::error::{RegistryError, RegistryResult};

/// Builds a stage from its configuration and the batch resources.
pub type StageConstructor =
    for<'r> fn(&StageSpec, &StageResources<'r>) -> RegistryResult<Box<dyn Stage + 'r>>;

/// Mapping from stage kind to constructor.
#[derive(Clone)]
pub struct StageRegistry {
    constructors: BTreeMap<String, StageConstructor>,
}

impl StageRegistry {
    /// Registry with all built-in kinds.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("url", experts::url_stage);
        registry.register("taxonomy", experts::taxonomy_stage);
        registry.register("filter", experts::filter_stage);
        registry.register("remove_affix", experts::remove_affix_stage);
        registry.register("set_field", experts::set_field_stage);
        registry.register("split", experts::split_stage);
        registry.register("sql_output", sql::sql_output_stage);
        registry
    }

    /// Registry without any kind.
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Register (or replace) a kind.
    pub fn register(&mut self, kind: impl Into<String>, constructor: StageConstructor) {
        self.constructors.insert(kind.into(), constructor);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Construct the configured chain, in order.
    pub fn build<'r>(
        &self,
        specs: &[StageSpec],
        resources: &StageResources<'r>,
    ) -> RegistryResult<Vec<Box<dyn Stage + 'r>>> {
        specs
            .iter()
            .map(|spec| {
                let constructor =
                    self.constructors
                        .get(&spec.kind)
                        .ok_or_else(|| RegistryError::UnknownKind {
                            id: spec.id.clone(),
                            kind: spec.kind.clone(),
                        })?;
                constructor(spec, resources)
            })
            .collect()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed access to a stage's parameter map.
pub struct Parameters<'a> {
    id: &'a str,
    values: &'a Map<String, Value>,
}

impl<'a> Parameters<'a> {
    pub fn of(spec: &'a StageSpec) -> Self {
        Self {
            id: &spec.id,
            values: &spec.parameters,
        }
    }

    pub fn invalid(&self, parameter: &str, message: impl Into<String>) -> RegistryError {
        RegistryError::InvalidParameter {
            id: self.id.to_string(),
            parameter: parameter.to_string(),
            message: message.into(),
        }
    }

    /// A required string parameter.
    pub fn string(&self, name: &str) -> RegistryResult<&'a str> {
        self.optional_string(name)?
            .ok_or_else(|| self.invalid(name, "is required"))
    }

    pub fn optional_string(&self, name: &str) -> RegistryResult<Option<&'a str>> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(self.invalid(name, "must be a string")),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> RegistryResult<bool> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(self.invalid(name, "must be a boolean")),
        }
    }

    pub fn optional_string_list(&self, name: &str) -> RegistryResult<Option<Vec<String>>> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.invalid(name, "must be a list of strings"))
                })
                .collect::<RegistryResult<Vec<_>>>()
                .map(Some),
            Some(_) => Err(self.invalid(name, "must be a list of strings")),
        }
    }

    pub fn object(&self, name: &str) -> RegistryResult<&'a Map<String, Value>> {
        match self.values.get(name) {
            Some(Value::Object(map)) => Ok(map),
            None => Err(self.invalid(name, "is required")),
            Some(_) => Err(self.invalid(name, "must be an object")),
        }
    }
}
