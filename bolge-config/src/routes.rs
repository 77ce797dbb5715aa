// Route table loading from YAML

use crate::loader::{FileLocator, parse_yaml, read_yaml, yaml_key, yaml_scalar, yaml_to_json};
use crate::{ConfigError, Result};
use bolge_core::{CONTROLLER_ATTRIBUTE, Route, RouteTable};
use serde_yaml::{Mapping, Value as Yaml};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const ROUTE_KEYS: &[&str] = &["path", "controller", "defaults", "requirements", "methods"];
const IMPORT_KEYS: &[&str] = &[
    "resource",
    "prefix",
    "controller",
    "defaults",
    "requirements",
    "methods",
];

/// Loads routes files of the form
///
/// ```yaml
/// blog_show:
///   path: /blog/{slug}
///   controller: app.blog::show
///   requirements: { slug: '[a-z0-9-]+' }
///   methods: [GET, HEAD]
///
/// admin:
///   resource: admin_routes.yaml
///   prefix: /admin
/// ```
///
/// Routes keep their file order. Imports are resolved relative to the
/// importing file.
#[derive(Debug, Clone)]
pub struct YamlRouteLoader {
    locator: FileLocator,
}

impl YamlRouteLoader {
    pub fn new(locator: FileLocator) -> Self {
        Self { locator }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<RouteTable> {
        let path = self.locator.locate(file)?;
        self.load_path(&path, &mut Vec::new())
    }

    /// Load routes from YAML text; imports resolve against the locator root
    pub fn load_str(&self, content: &str, source: &str) -> Result<RouteTable> {
        let yaml = parse_yaml(content, source)?;
        self.parse(yaml, self.locator.root(), source, &mut Vec::new())
    }

    fn load_path(&self, path: &Path, stack: &mut Vec<PathBuf>) -> Result<RouteTable> {
        let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if stack.contains(&canonical) {
            return Err(ConfigError::LoadError(format!(
                "circular import of {}",
                path.display()
            )));
        }

        stack.push(canonical);
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let result = self.parse(read_yaml(path)?, base, &path.display().to_string(), stack);
        stack.pop();

        let routes = result?;
        debug!(file = %path.display(), routes = routes.len(), "Loaded routes");
        Ok(routes)
    }

    fn parse(
        &self,
        yaml: Yaml,
        base: &Path,
        source: &str,
        stack: &mut Vec<PathBuf>,
    ) -> Result<RouteTable> {
        let mut routes = RouteTable::new();

        let entries = match yaml {
            Yaml::Null => return Ok(routes),
            Yaml::Mapping(entries) => entries,
            _ => {
                return Err(ConfigError::ParseError(format!(
                    "{}: a routes file must contain a mapping",
                    source
                )));
            }
        };

        for (name, definition) in entries {
            let name = yaml_key(&name)?;
            let invalid =
                |problem: String| ConfigError::InvalidRoute(format!("{}: \"{}\" {}", source, name, problem));

            let Yaml::Mapping(definition) = definition else {
                return Err(invalid("must be a mapping".to_string()));
            };

            if definition.contains_key("resource") {
                check_keys(&definition, IMPORT_KEYS).map_err(invalid)?;
                let imported = self.import(&definition, base, stack)?;
                let imported = apply_overrides(imported, &definition).map_err(invalid)?;
                let prefix = string_entry(&definition, "prefix").map_err(invalid)?;
                routes.add_collection(imported, prefix.as_deref())?;
                continue;
            }

            check_keys(&definition, ROUTE_KEYS).map_err(invalid)?;
            let path = string_entry(&definition, "path")
                .map_err(invalid)?
                .ok_or_else(|| invalid("has no \"path\"".to_string()))?;

            let route = apply_overrides_to(Route::new(path), &definition).map_err(invalid)?;
            routes.add(name.clone(), route).map_err(|e| invalid(e.to_string()))?;
        }

        Ok(routes)
    }

    fn import(&self, definition: &Mapping, base: &Path, stack: &mut Vec<PathBuf>) -> Result<RouteTable> {
        let resource = definition
            .get("resource")
            .and_then(Yaml::as_str)
            .ok_or_else(|| ConfigError::InvalidRoute("\"resource\" must be a string".to_string()))?;

        let path = FileLocator::new(base).locate(resource)?;
        self.load_path(&path, stack)
    }
}

fn check_keys(definition: &Mapping, allowed: &[&str]) -> std::result::Result<(), String> {
    for key in definition.keys() {
        let key = key.as_str().unwrap_or_default();
        if !allowed.contains(&key) {
            return Err(format!(
                "has unsupported key \"{}\" (expected one of \"{}\")",
                key,
                allowed.join("\", \"")
            ));
        }
    }
    Ok(())
}

fn string_entry(definition: &Mapping, key: &str) -> std::result::Result<Option<String>, String> {
    match definition.get(key) {
        None | Some(Yaml::Null) => Ok(None),
        Some(value) => yaml_scalar(value)
            .map(Some)
            .ok_or_else(|| format!("\"{}\" must be a string", key)),
    }
}

/// Apply `controller`, `defaults`, `requirements` and `methods` to a route
fn apply_overrides_to(mut route: Route, definition: &Mapping) -> std::result::Result<Route, String> {
    let controller = string_entry(definition, "controller")?;

    if let Some(defaults) = definition.get("defaults") {
        let Yaml::Mapping(defaults) = defaults else {
            return Err("\"defaults\" must be a mapping".to_string());
        };
        if controller.is_some() && defaults.contains_key(CONTROLLER_ATTRIBUTE) {
            return Err(format!(
                "defines both \"controller\" and \"defaults.{}\"",
                CONTROLLER_ATTRIBUTE
            ));
        }
        for (key, value) in defaults.clone() {
            let key = yaml_key(&key).map_err(|e| e.to_string())?;
            let value = yaml_to_json(value).map_err(|e| e.to_string())?;
            route = route.with_default(key, value);
        }
    }

    if let Some(controller) = controller {
        route = route.with_controller(controller);
    }

    if let Some(requirements) = definition.get("requirements") {
        let Yaml::Mapping(requirements) = requirements else {
            return Err("\"requirements\" must be a mapping".to_string());
        };
        for (key, value) in requirements {
            let key = yaml_key(key).map_err(|e| e.to_string())?;
            let regex = yaml_scalar(value)
                .ok_or_else(|| format!("requirement \"{}\" must be a string", key))?;
            route = route.with_requirement(key, regex);
        }
    }

    match definition.get("methods") {
        None | Some(Yaml::Null) => {}
        Some(Yaml::String(methods)) => {
            route = route.with_methods(methods.split('|').map(str::trim).filter(|m| !m.is_empty()));
        }
        Some(Yaml::Sequence(methods)) => {
            let methods = methods
                .iter()
                .map(|m| m.as_str().ok_or_else(|| "\"methods\" must list strings".to_string()))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            route = route.with_methods(methods);
        }
        Some(_) => return Err("\"methods\" must be a string or a list".to_string()),
    }

    Ok(route)
}

/// Apply the import-level overrides to every imported route
fn apply_overrides(imported: RouteTable, definition: &Mapping) -> std::result::Result<RouteTable, String> {
    let mut routes = RouteTable::new();
    for (name, route) in imported.iter() {
        let route = apply_overrides_to(route.clone(), definition)?;
        routes.add(name, route).map_err(|e| e.to_string())?;
    }
    Ok(routes)
}
