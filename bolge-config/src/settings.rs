// Plugin settings parsed from config/settings.yaml

use crate::loader::{parse_yaml, read_yaml, yaml_to_json};
use crate::{ConfigError, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::Path;

/// Settings tree.
///
/// The object form; [`to_array`](Settings::to_array) gives the same data as
/// a plain map. Values are addressed by top-level key, dotted path
/// (`database.host`, `mirrors.0`) or JSON pointer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    root: Map<String, Value>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(root: Map<String, Value>) -> Self {
        Self { root }
    }

    /// Parse settings from YAML text. Blank input gives empty settings.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Self::from_yaml(parse_yaml(content, "settings")?, "settings")
    }

    /// Parse a settings file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        Self::from_yaml(read_yaml(path)?, &path.display().to_string())
    }

    fn from_yaml(yaml: serde_yaml::Value, source: &str) -> Result<Self> {
        match yaml_to_json(yaml)? {
            Value::Null => Ok(Self::new()),
            Value::Object(root) => Ok(Self { root }),
            other => Err(ConfigError::ParseError(format!(
                "{}: expected a mapping at the top level, found {}",
                source,
                kind(&other)
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    /// Lookup by dotted path. Numeric segments index into lists.
    pub fn path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.root.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Lookup by JSON pointer, e.g. `/database/host`
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        let rest = pointer.strip_prefix('/')?;
        let (first, tail) = match rest.split_once('/') {
            Some((first, tail)) => (first, Some(tail)),
            None => (rest, None),
        };
        let first = first.replace("~1", "/").replace("~0", "~");
        let value = self.root.get(&first)?;
        match tail {
            Some(tail) => value.pointer(&format!("/{}", tail)),
            None => Some(value),
        }
    }

    pub fn has(&self, path: &str) -> bool {
        self.path(path).is_some()
    }

    /// Typed value at a dotted path
    pub fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let value = self
            .path(path)
            .ok_or_else(|| ConfigError::KeyNotFound(path.to_string()))?;
        serde_json::from_value(value.clone())
            .map_err(|e| ConfigError::DeserializationError(format!("{}: {}", path, e)))
    }

    pub fn get_or<T: DeserializeOwned>(&self, path: &str, default: T) -> T {
        self.get_as(path).unwrap_or(default)
    }

    /// The whole tree as a typed structure
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.root.clone()))
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))
    }

    /// Nested mapping as its own settings
    pub fn section(&self, path: &str) -> Option<Settings> {
        match self.path(path)? {
            Value::Object(map) => Some(Settings::from_map(map.clone())),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.root.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    /// Array form: a plain copy of the tree
    pub fn to_array(&self) -> Map<String, Value> {
        self.root.clone()
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}
