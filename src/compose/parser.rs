//! Docker Compose document codec
//!
//! Converts between YAML text and [`ComposeSpecification`]. Parsing
//! validates the document against the typed model; serializing can either
//! omit absent fields (the normal mode) or spell them out as `null`.

use super::config::ComposeSpecification;
use crate::error::{ComposeError, Result};
use serde_yaml::{Mapping, Value};
use std::cell::Cell;
use std::path::{Path, PathBuf};

/// Default compose file names
pub const DEFAULT_COMPOSE_FILES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

thread_local! {
    static OMIT_ABSENT: Cell<bool> = const { Cell::new(true) };
}

/// `skip_serializing_if` hook shared by every optional model field.
///
/// serde offers no per-call serializer context, so the omission mode lives in
/// a thread-local that [`ComposeParser::serialize`] scopes around one call.
pub(crate) fn is_absent<T>(value: &Option<T>) -> bool {
    value.is_none() && OMIT_ABSENT.with(Cell::get)
}

/// Restores the previous omission mode when dropped
struct OmitAbsentGuard {
    previous: bool,
}

impl OmitAbsentGuard {
    fn set(omit_absent: bool) -> Self {
        let previous = OMIT_ABSENT.with(|cell| cell.replace(omit_absent));
        Self { previous }
    }
}

impl Drop for OmitAbsentGuard {
    fn drop(&mut self) {
        OMIT_ABSENT.with(|cell| cell.set(self.previous));
    }
}

/// Compose file parser
pub struct ComposeParser;

impl ComposeParser {
    /// Find compose file in directory
    pub fn find_compose_file(dir: &Path) -> Option<PathBuf> {
        DEFAULT_COMPOSE_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Parse compose file from path
    pub fn parse_file(path: &Path) -> Result<ComposeSpecification> {
        let content = std::fs::read_to_string(path)?;
        tracing::debug!("Parsing compose file {}", path.display());
        Self::parse_str(&content)
    }

    /// Parse compose document from string
    pub fn parse_str(content: &str) -> Result<ComposeSpecification> {
        let value: Value = serde_yaml::from_str(content)
            .map_err(|e| ComposeError::Yaml(format!("Failed to parse YAML: {}", e)))?;
        Self::from_value(value)
    }

    /// Validate a YAML value tree against the model
    pub fn from_value(value: Value) -> Result<ComposeSpecification> {
        if value.is_null() {
            return Ok(ComposeSpecification::default());
        }
        if !value.is_mapping() {
            return Err(ComposeError::Validation(format!(
                "top-level document must be a mapping, got {}",
                value_kind(&value)
            )));
        }
        serde_yaml::from_value(value).map_err(|e| ComposeError::Validation(e.to_string()))
    }

    /// Lower a specification to a YAML value tree with absent fields omitted
    pub fn to_value(spec: &ComposeSpecification) -> Result<Value> {
        let _guard = OmitAbsentGuard::set(true);
        serde_yaml::to_value(spec).map_err(|e| ComposeError::Yaml(e.to_string()))
    }

    /// Render a specification as YAML
    ///
    /// With `omit_absent` unset, fields that are not present are written as
    /// explicit `null` entries. Every mapping, struct fields included, is
    /// emitted with its keys sorted.
    pub fn serialize(spec: &ComposeSpecification, omit_absent: bool) -> Result<String> {
        let value = {
            let _guard = OmitAbsentGuard::set(omit_absent);
            serde_yaml::to_value(spec).map_err(|e| ComposeError::Yaml(e.to_string()))?
        };
        serde_yaml::to_string(&sort_keys(value)).map_err(|e| ComposeError::Yaml(e.to_string()))
    }
}

/// Recursively reorder mapping keys
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Mapping(mapping) => {
            let mut entries: Vec<(Value, Value)> = mapping.into_iter().collect();
            entries.sort_by_cached_key(|(key, _)| key_text(key));
            Value::Mapping(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, sort_keys(value)))
                    .collect::<Mapping>(),
            )
        }
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

fn key_text(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other).unwrap_or_default(),
    }
}

/// Short name of a YAML node kind for error messages
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
