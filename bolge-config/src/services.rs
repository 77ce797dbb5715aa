// Service definitions loading from YAML

use crate::loader::{FileLocator, parse_yaml, read_yaml, yaml_key, yaml_to_json};
use crate::{ConfigError, Result};
use bolge_core::{Argument, ContainerBuilder, ServiceDefinition, Tag};
use serde_yaml::{Mapping, Value as Yaml};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const SERVICE_KEYS: &[&str] = &["class", "arguments", "public", "shared", "alias", "tags"];

/// Loads service files into a [`ContainerBuilder`]:
///
/// ```yaml
/// imports:
///   - { resource: services_admin.yaml }
///
/// parameters:
///   mailer.sender: noreply@example.com
///
/// services:
///   _defaults:
///     public: true
///   app.mailer:
///     class: App\Mailer
///     arguments: ['%mailer.sender%', '@?logger']
///     tags: [event_subscriber]
///   mailer: '@app.mailer'
///   App\Controller\HomeController: ~
/// ```
///
/// Definitions replace earlier ones with the same id.
#[derive(Debug, Clone)]
pub struct YamlServiceLoader {
    locator: FileLocator,
}

impl YamlServiceLoader {
    pub fn new(locator: FileLocator) -> Self {
        Self { locator }
    }

    pub fn load(&self, builder: &mut ContainerBuilder, file: impl AsRef<Path>) -> Result<()> {
        let path = self.locator.locate(file)?;
        self.load_path(builder, &path, &mut Vec::new())
    }

    /// Load definitions from YAML text; imports resolve against the locator root
    pub fn load_str(&self, builder: &mut ContainerBuilder, content: &str, source: &str) -> Result<()> {
        let yaml = parse_yaml(content, source)?;
        self.parse(builder, yaml, self.locator.root(), source, &mut Vec::new())
    }

    fn load_path(&self, builder: &mut ContainerBuilder, path: &Path, stack: &mut Vec<PathBuf>) -> Result<()> {
        let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if stack.contains(&canonical) {
            return Err(ConfigError::LoadError(format!(
                "circular import of {}",
                path.display()
            )));
        }

        stack.push(canonical);
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let result = self.parse(builder, read_yaml(path)?, base, &path.display().to_string(), stack);
        stack.pop();

        result?;
        debug!(file = %path.display(), "Loaded service definitions");
        Ok(())
    }

    fn parse(
        &self,
        builder: &mut ContainerBuilder,
        yaml: Yaml,
        base: &Path,
        source: &str,
        stack: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let content = match yaml {
            Yaml::Null => return Ok(()),
            Yaml::Mapping(content) => content,
            _ => {
                return Err(ConfigError::ParseError(format!(
                    "{}: a services file must contain a mapping",
                    source
                )));
            }
        };

        for key in content.keys() {
            let key = key.as_str().unwrap_or_default();
            if !["imports", "parameters", "services"].contains(&key) {
                return Err(ConfigError::InvalidService(format!(
                    "{}: unsupported top-level key \"{}\"",
                    source, key
                )));
            }
        }

        if let Some(imports) = content.get("imports") {
            self.parse_imports(builder, imports, base, source, stack)?;
        }
        if let Some(parameters) = content.get("parameters") {
            parse_parameters(builder, parameters, source)?;
        }
        if let Some(services) = content.get("services") {
            parse_services(builder, services, source)?;
        }
        Ok(())
    }

    fn parse_imports(
        &self,
        builder: &mut ContainerBuilder,
        imports: &Yaml,
        base: &Path,
        source: &str,
        stack: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let invalid = || ConfigError::InvalidService(format!("{}: \"imports\" must list {{ resource: file }} entries", source));

        let Yaml::Sequence(imports) = imports else {
            return Err(invalid());
        };
        for import in imports {
            let resource = match import {
                Yaml::String(resource) => resource.as_str(),
                Yaml::Mapping(import) => import.get("resource").and_then(Yaml::as_str).ok_or_else(invalid)?,
                _ => return Err(invalid()),
            };
            let path = FileLocator::new(base).locate(resource)?;
            self.load_path(builder, &path, stack)?;
        }
        Ok(())
    }
}

fn parse_parameters(builder: &mut ContainerBuilder, parameters: &Yaml, source: &str) -> Result<()> {
    match parameters {
        Yaml::Null => Ok(()),
        Yaml::Mapping(parameters) => {
            for (name, value) in parameters {
                builder.set_parameter(yaml_key(name)?, yaml_to_json(value.clone())?);
            }
            Ok(())
        }
        _ => Err(ConfigError::InvalidService(format!(
            "{}: \"parameters\" must be a mapping",
            source
        ))),
    }
}

fn parse_services(builder: &mut ContainerBuilder, services: &Yaml, source: &str) -> Result<()> {
    let services = match services {
        Yaml::Null => return Ok(()),
        Yaml::Mapping(services) => services,
        _ => {
            return Err(ConfigError::InvalidService(format!(
                "{}: \"services\" must be a mapping",
                source
            )));
        }
    };

    let mut public_default = false;

    for (id, entry) in services {
        let id = yaml_key(id)?;
        let invalid = |problem: &str| {
            ConfigError::InvalidService(format!("{}: service \"{}\" {}", source, id, problem))
        };

        if id == "_defaults" {
            let Yaml::Mapping(defaults) = entry else {
                return Err(invalid("must be a mapping"));
            };
            for (key, value) in defaults {
                match (key.as_str(), value) {
                    (Some("public"), Yaml::Bool(public)) => public_default = *public,
                    _ => return Err(invalid("supports only a boolean \"public\"")),
                }
            }
            continue;
        }

        match entry {
            Yaml::Null => {
                builder.register(id.clone(), ServiceDefinition::new().with_public(public_default));
            }
            Yaml::String(target) => {
                let target = target
                    .strip_prefix('@')
                    .ok_or_else(|| invalid("must reference its alias target as '@id'"))?;
                builder.set_alias(id.clone(), target);
            }
            Yaml::Mapping(entry) => {
                if let Some(target) = entry.get("alias") {
                    let target = target
                        .as_str()
                        .ok_or_else(|| invalid("\"alias\" must be a string"))?;
                    if entry.keys().any(|k| !matches!(k.as_str(), Some("alias" | "public"))) {
                        return Err(invalid("cannot combine \"alias\" with other keys"));
                    }
                    builder.set_alias(id.clone(), target);
                    continue;
                }

                let definition = parse_definition(entry, public_default)
                    .map_err(|problem| invalid(&problem))?;
                builder.register(id.clone(), definition);
            }
            _ => return Err(invalid("must be null, an '@alias' or a mapping")),
        }
    }

    Ok(())
}

fn parse_definition(entry: &Mapping, public_default: bool) -> std::result::Result<ServiceDefinition, String> {
    for key in entry.keys() {
        let key = key.as_str().unwrap_or_default();
        if !SERVICE_KEYS.contains(&key) {
            return Err(format!("has unsupported key \"{}\"", key));
        }
    }

    let mut definition = ServiceDefinition::new().with_public(public_default);

    match entry.get("class") {
        None | Some(Yaml::Null) => {}
        Some(Yaml::String(class)) => definition = definition.with_class(class.as_str()),
        Some(_) => return Err("\"class\" must be a string".to_string()),
    }

    match entry.get("arguments") {
        None | Some(Yaml::Null) => {}
        Some(Yaml::Sequence(arguments)) => {
            for argument in arguments {
                let value = yaml_to_json(argument.clone()).map_err(|e| e.to_string())?;
                definition = definition.with_argument(Argument::parse(value));
            }
        }
        Some(_) => return Err("\"arguments\" must be a list".to_string()),
    }

    for flag in ["public", "shared"] {
        match entry.get(flag) {
            None => {}
            Some(Yaml::Bool(value)) if flag == "public" => definition = definition.with_public(*value),
            Some(Yaml::Bool(value)) => definition = definition.with_shared(*value),
            Some(_) => return Err(format!("\"{}\" must be a boolean", flag)),
        }
    }

    match entry.get("tags") {
        None | Some(Yaml::Null) => {}
        Some(Yaml::Sequence(tags)) => {
            for tag in tags {
                definition = definition.with_tag(parse_tag(tag)?);
            }
        }
        Some(_) => return Err("\"tags\" must be a list".to_string()),
    }

    Ok(definition)
}

fn parse_tag(tag: &Yaml) -> std::result::Result<Tag, String> {
    match tag {
        Yaml::String(name) => Ok(Tag::new(name.as_str())),
        Yaml::Mapping(attributes) => {
            let mut name = None;
            let mut tag_attributes = serde_json::Map::new();
            for (key, value) in attributes {
                let key = yaml_key(key).map_err(|e| e.to_string())?;
                let value = yaml_to_json(value.clone()).map_err(|e| e.to_string())?;
                if key == "name" {
                    name = value.as_str().map(str::to_string);
                } else {
                    tag_attributes.insert(key, value);
                }
            }
            let name = name.ok_or_else(|| "has a tag without a \"name\"".to_string())?;
            Ok(Tag {
                name,
                attributes: tag_attributes,
            })
        }
        _ => Err("tags must be strings or mappings".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolge_core::{Error, ResolvedArguments};
    use serde_json::json;

    struct Mailer {
        sender: String,
    }

    fn builder() -> ContainerBuilder {
        let mut builder = ContainerBuilder::new();
        builder
            .catalog_mut()
            .register_class("App\\Mailer", |args: &ResolvedArguments| {
                Ok(Mailer {
                    sender: args.str(0)?,
                })
            });
        builder
    }

    fn loader() -> YamlServiceLoader {
        YamlServiceLoader::new(FileLocator::new("."))
    }

    #[test]
    fn test_load_definitions() {
        let mut builder = builder();
        loader()
            .load_str(
                &mut builder,
                r#"
parameters:
  mailer.sender: noreply@example.com
services:
  _defaults:
    public: true
  app.mailer:
    class: App\Mailer
    arguments: ['%mailer.sender%']
    tags:
      - event_subscriber
      - { name: cache.warmer, priority: 5 }
  mailer: '@app.mailer'
  internal:
    class: App\Mailer
    arguments: ['x']
    public: false
    shared: false
"#,
                "services.yaml",
            )
            .unwrap();

        let definition = builder.definition("app.mailer").unwrap();
        assert!(definition.is_public());
        assert!(definition.has_tag("event_subscriber"));
        assert_eq!(definition.tags()[1].attributes.get("priority"), Some(&json!(5)));

        let internal = builder.definition("internal").unwrap();
        assert!(!internal.is_public());
        assert!(!internal.is_shared());

        let container = builder.compile().unwrap();
        assert_eq!(container.get::<Mailer>("mailer").unwrap().sender, "noreply@example.com");
        assert!(matches!(container.get::<Mailer>("internal"), Err(Error::ServiceNotFound(_))));
    }

    #[test]
    fn test_later_definitions_replace_earlier_ones() {
        let mut builder = builder();
        let loader = loader();
        loader
            .load_str(
                &mut builder,
                "services:\n  app.mailer: { class: App\\Mailer, arguments: [a], public: true }\n",
                "core",
            )
            .unwrap();
        loader
            .load_str(
                &mut builder,
                "services:\n  app.mailer: { class: App\\Mailer, arguments: [b], public: true }\n",
                "plugin",
            )
            .unwrap();

        let container = builder.compile().unwrap();
        assert_eq!(container.get::<Mailer>("app.mailer").unwrap().sender, "b");
    }

    #[test]
    fn test_null_entry_uses_id_as_class() {
        let mut builder = builder();
        loader()
            .load_str(&mut builder, "services:\n  App\\Mailer: ~\n", "services.yaml")
            .unwrap();
        assert!(builder.definition("App\\Mailer").unwrap().class().is_none());
    }

    #[test]
    fn test_invalid_definitions() {
        let cases = [
            "services: [a]",
            "services:\n  a: plain-string\n",
            "services:\n  a: { klass: X }\n",
            "services:\n  a: { arguments: { x: 1 } }\n",
            "services:\n  a: { public: 'yes' }\n",
            "services:\n  a: { alias: b, class: X }\n",
            "services:\n  a: { tags: [{ priority: 1 }] }\n",
            "services:\n  _defaults: { autowire: true }\n",
            "extensions: {}\n",
        ];

        for case in cases {
            let result = loader().load_str(&mut builder(), case, "services.yaml");
            assert!(
                matches!(result, Err(ConfigError::InvalidService(_))),
                "{} should be rejected, got {:?}",
                case,
                result
            );
        }
    }
}
