// Environment variables from a plugin's .env file

use crate::{ConfigError, Result};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Variables loaded from `.env`, as seen after loading.
///
/// Loading exports the file's variables to the process without overriding
/// variables that are already set; the snapshot records the winning values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot with fixed values, for tests and embedding
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Load `<dir>/.env`. A missing file yields an empty snapshot.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(".env");
        if !path.is_file() {
            debug!(path = %path.display(), "No .env file");
            return Ok(Self::new());
        }

        dotenvy::from_path(&path)
            .map_err(|e| ConfigError::EnvError(format!("{}: {}", path.display(), e)))?;

        let entries = dotenvy::from_path_iter(&path)
            .map_err(|e| ConfigError::EnvError(format!("{}: {}", path.display(), e)))?;

        let mut vars = HashMap::new();
        for entry in entries {
            let (key, value) =
                entry.map_err(|e| ConfigError::EnvError(format!("{}: {}", path.display(), e)))?;
            let value = std::env::var(&key).unwrap_or(value);
            vars.insert(key, value);
        }

        debug!(path = %path.display(), count = vars.len(), "Loaded environment variables");
        Ok(Self { vars })
    }

    /// Value of `key`, from the snapshot or else the process environment
    pub fn get(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .cloned()
            .or_else(|| std::env::var(key).ok())
    }

    pub fn var(&self, key: &str) -> Result<String> {
        self.get(key)
            .ok_or_else(|| ConfigError::KeyNotFound(key.to_string()))
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// `ENV` value, `prod` when unset
    pub fn name(&self) -> String {
        self.get_or("ENV", "prod")
    }

    pub fn is_dev(&self) -> bool {
        self.get("ENV").as_deref() == Some("dev")
    }

    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::load(dir.path()).unwrap();
        assert!(env.vars().is_empty());
    }

    #[test]
    fn test_load_exports_variables() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "BOLGE_ENV_TEST_NAME=shop\n# comment\nBOLGE_ENV_TEST_QUOTED=\"a b\"\n",
        )
        .unwrap();

        let env = Environment::load(dir.path()).unwrap();
        assert_eq!(env.get("BOLGE_ENV_TEST_NAME").as_deref(), Some("shop"));
        assert_eq!(env.get("BOLGE_ENV_TEST_QUOTED").as_deref(), Some("a b"));
        assert_eq!(std::env::var("BOLGE_ENV_TEST_NAME").unwrap(), "shop");
    }

    #[test]
    fn test_process_variables_win() {
        let dir = tempfile::tempdir().unwrap();
        // PATH is set for any test process
        let path = std::env::var("PATH").unwrap();
        std::fs::write(dir.path().join(".env"), "PATH=/overridden\n").unwrap();

        let env = Environment::load(dir.path()).unwrap();
        assert_eq!(env.get("PATH"), Some(path));
    }

    #[test]
    fn test_dev_mode() {
        assert!(Environment::from_vars([("ENV", "dev")]).is_dev());
        assert!(!Environment::from_vars([("ENV", "prod")]).is_dev());
        assert_eq!(Environment::from_vars([("ENV", "staging")]).name(), "staging");
    }

    #[test]
    fn test_missing_key() {
        let env = Environment::from_vars([("A", "1")]);
        assert!(matches!(
            env.var("BOLGE_SURELY_UNSET_98765"),
            Err(ConfigError::KeyNotFound(_))
        ));
        assert_eq!(env.get_or("BOLGE_SURELY_UNSET_98765", "x"), "x");
    }
}
