// File lookup and YAML parsing shared by the loaders

use crate::{ConfigError, Result};
use serde_json::{Map, Number, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Resolves configuration file names against a base directory
#[derive(Debug, Clone, PartialEq)]
pub struct FileLocator {
    root: PathBuf,
}

impl FileLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of `name`, which must exist. Absolute names are used as is.
    pub fn locate(&self, name: impl AsRef<Path>) -> Result<PathBuf> {
        let name = name.as_ref();
        let path = if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.root.join(name)
        };

        if path.is_file() {
            Ok(path)
        } else {
            Err(ConfigError::NotFound(path.display().to_string()))
        }
    }
}

/// Read and parse a YAML file
pub fn read_yaml(path: &Path) -> Result<serde_yaml::Value> {
    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?;
    parse_yaml(&content, &path.display().to_string())
}

/// Parse YAML text. Blank input is null.
pub fn parse_yaml(content: &str, source: &str) -> Result<serde_yaml::Value> {
    if content.trim().is_empty() {
        return Ok(serde_yaml::Value::Null);
    }
    serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(format!("{}: {}", source, e)))
}

/// Convert a YAML tree to JSON. Mapping keys are stringified; tags are dropped.
pub fn yaml_to_json(value: serde_yaml::Value) -> Result<Value> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| ConfigError::ParseError(format!("unsupported number {}", n)))?
            }
        }
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<Result<Vec<_>>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = Map::with_capacity(mapping.len());
            for (key, value) in mapping {
                map.insert(yaml_key(&key)?, yaml_to_json(value)?);
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

/// String form of a mapping key
pub(crate) fn yaml_key(key: &serde_yaml::Value) -> Result<String> {
    use serde_yaml::Value as Yaml;

    match key {
        Yaml::String(s) => Ok(s.clone()),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::Bool(b) => Ok(b.to_string()),
        Yaml::Null => Ok(String::new()),
        other => Err(ConfigError::ParseError(format!(
            "unsupported mapping key {:?}",
            other
        ))),
    }
}

/// Scalar as a string (numbers and booleans included)
pub(crate) fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    use serde_yaml::Value as Yaml;

    match value {
        Yaml::String(s) => Some(s.clone()),
        Yaml::Number(n) => Some(n.to_string()),
        Yaml::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
