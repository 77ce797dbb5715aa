//! Entity mapping metadata and the YAML mapping driver.
//!
//! Mapping files follow the Doctrine YAML layout:
//!
//! ```yaml
//! App\Entity\Product:
//!   type: entity
//!   table: products
//!   id:
//!     id: { type: integer, generator: { strategy: AUTO } }
//!   fields:
//!     name: { type: string, length: 120 }
//!     price: { type: decimal, precision: 10, scale: 2, nullable: true }
//! ```

use crate::{OrmError, OrmResult};
use once_cell::sync::OnceCell;
use serde_json::Value;
use serde_yaml::{Mapping, Value as Yaml};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Portable column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    SmallInt,
    BigInt,
    String,
    Text,
    Boolean,
    /// Double precision
    Float,
    Decimal,
    Date,
    DateTime,
    Time,
    Json,
    Guid,
}

impl ColumnType {
    /// Parse a mapping type name.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "integer" => ColumnType::Integer,
            "smallint" => ColumnType::SmallInt,
            "bigint" => ColumnType::BigInt,
            "string" => ColumnType::String,
            "text" => ColumnType::Text,
            "boolean" => ColumnType::Boolean,
            "float" => ColumnType::Float,
            "decimal" => ColumnType::Decimal,
            "date" | "date_immutable" => ColumnType::Date,
            "datetime" | "datetime_immutable" => ColumnType::DateTime,
            "time" | "time_immutable" => ColumnType::Time,
            "json" => ColumnType::Json,
            "guid" => ColumnType::Guid,
            _ => return None,
        })
    }

    /// Whether the type can carry an auto-increment identifier.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::Integer | ColumnType::SmallInt | ColumnType::BigInt
        )
    }
}

/// Mapping of one entity field to a column.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    /// Field name on the entity.
    pub field_name: String,
    /// Column name; defaults to the field name.
    pub column_name: String,
    pub column_type: ColumnType,
    /// String length; 255 when unset.
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
    pub nullable: bool,
    pub unique: bool,
    /// Part of the primary key.
    pub id: bool,
    /// Generated by the database.
    pub auto_increment: bool,
    /// Column default from `options.default`.
    pub default: Option<Value>,
}

impl FieldMapping {
    /// A non-null column named after the field.
    pub fn new(field_name: impl Into<String>, column_type: ColumnType) -> Self {
        let field_name = field_name.into();
        Self {
            column_name: field_name.clone(),
            field_name,
            column_type,
            length: None,
            precision: None,
            scale: None,
            nullable: false,
            unique: false,
            id: false,
            auto_increment: false,
            default: None,
        }
    }
}

/// Everything known about one mapped entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMetadata {
    /// Fully qualified class name, e.g. `App\Entity\Product`.
    pub class_name: String,
    pub table_name: String,
    /// Identifier fields first, then regular fields, in file order.
    pub fields: Vec<FieldMapping>,
}

impl EntityMetadata {
    /// Metadata with the default table name, the short class name.
    pub fn new(class_name: impl Into<String>) -> Self {
        let class_name = class_name.into();
        let table_name = short_name(&class_name).to_string();
        Self {
            class_name,
            table_name,
            fields: Vec::new(),
        }
    }

    /// Identifier fields.
    pub fn identifier(&self) -> impl Iterator<Item = &FieldMapping> {
        self.fields.iter().filter(|f| f.id)
    }

    /// Field by name.
    pub fn field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.field_name == name)
    }

    /// Field by column name.
    pub fn column(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.column_name == name)
    }

    fn add_field(&mut self, field: FieldMapping) -> OrmResult<()> {
        if self.column(&field.column_name).is_some() {
            return Err(OrmError::Mapping(format!(
                "{}: column \"{}\" is mapped twice",
                self.class_name, field.column_name
            )));
        }
        self.fields.push(field);
        Ok(())
    }
}

fn short_name(class_name: &str) -> &str {
    class_name
        .rsplit(['\\', ':'])
        .find(|part| !part.is_empty())
        .unwrap_or(class_name)
}

/// Source of entity metadata.
pub trait MetadataDriver: Send + Sync {
    /// Every mapped class, sorted.
    fn all_class_names(&self) -> OrmResult<Vec<String>>;

    /// Metadata of one class, before any listener has run.
    fn load_metadata(&self, class_name: &str) -> OrmResult<EntityMetadata>;
}

type MappingFiles = BTreeMap<String, (PathBuf, Mapping)>;

/// Reads `*.orm.yml`, `*.orm.yaml`, `*.yml` and `*.yaml` files below the
/// configured directories.
///
/// The directories are scanned once, on first use; later changes to the
/// files are not seen by the same driver.
#[derive(Debug, Clone)]
pub struct YamlDriver {
    paths: Vec<PathBuf>,
    classes: OnceCell<MappingFiles>,
}

impl YamlDriver {
    /// Driver over `paths`.
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            classes: OnceCell::new(),
        }
    }

    fn classes(&self) -> OrmResult<&MappingFiles> {
        self.classes.get_or_try_init(|| self.scan())
    }

    /// Mapping documents by class name.
    fn scan(&self) -> OrmResult<MappingFiles> {
        let mut files = Vec::new();
        for path in &self.paths {
            if !path.is_dir() {
                return Err(OrmError::Mapping(format!(
                    "entity directory {} does not exist",
                    path.display()
                )));
            }
            collect_files(path, &mut files)?;
        }
        files.sort();

        let mut classes: MappingFiles = BTreeMap::new();
        for file in files {
            trace!(file = %file.display(), "Reading mapping file");
            let content = fs::read_to_string(&file)
                .map_err(|e| OrmError::Mapping(format!("{}: {}", file.display(), e)))?;
            if content.trim().is_empty() {
                continue;
            }

            let document: Yaml = serde_yaml::from_str(&content)
                .map_err(|e| OrmError::Mapping(format!("{}: {}", file.display(), e)))?;
            let Yaml::Mapping(document) = document else {
                return Err(OrmError::Mapping(format!(
                    "{}: expected a mapping of class names",
                    file.display()
                )));
            };

            for (class, mapping) in document {
                let class = class.as_str().map(str::to_string).ok_or_else(|| {
                    OrmError::Mapping(format!("{}: class names must be strings", file.display()))
                })?;
                let Yaml::Mapping(mapping) = mapping else {
                    return Err(OrmError::Mapping(format!(
                        "{}: mapping of {} must be a mapping",
                        file.display(),
                        class
                    )));
                };
                if !is_entity(&mapping, &class)? {
                    continue;
                }
                if let Some((previous, _)) = classes.get(&class) {
                    return Err(OrmError::Mapping(format!(
                        "{} is mapped in both {} and {}",
                        class,
                        previous.display(),
                        file.display()
                    )));
                }
                classes.insert(class, (file.clone(), mapping));
            }
        }

        Ok(classes)
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> OrmResult<()> {
    let entries = fs::read_dir(dir)
        .map_err(|e| OrmError::Mapping(format!("{}: {}", dir.display(), e)))?;
    for entry in entries {
        let path = entry
            .map_err(|e| OrmError::Mapping(format!("{}: {}", dir.display(), e)))?
            .path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml" | "yaml")
        ) {
            files.push(path);
        }
    }
    Ok(())
}

fn is_entity(mapping: &Mapping, class: &str) -> OrmResult<bool> {
    match mapping.get("type").and_then(Yaml::as_str) {
        None | Some("entity") => Ok(true),
        Some("mappedSuperclass" | "embeddable") => Ok(false),
        Some(other) => Err(OrmError::Mapping(format!(
            "{}: unknown mapping type \"{}\"",
            class, other
        ))),
    }
}

impl MetadataDriver for YamlDriver {
    fn all_class_names(&self) -> OrmResult<Vec<String>> {
        let names: Vec<String> = self.classes()?.keys().cloned().collect();
        debug!(classes = names.len(), "Discovered mapped entities");
        Ok(names)
    }

    fn load_metadata(&self, class_name: &str) -> OrmResult<EntityMetadata> {
        let (_, mapping) = self
            .classes()?
            .get(class_name)
            .ok_or_else(|| OrmError::Mapping(format!("no mapping found for {}", class_name)))?;
        parse_entity(class_name, mapping)
    }
}

const ENTITY_KEYS: &[&str] = &["type", "table", "repositoryClass", "id", "fields"];
const FIELD_KEYS: &[&str] = &["type", "column", "length", "precision", "scale", "nullable", "unique", "options"];
const FIELD_OPTION_KEYS: &[&str] = &["default"];

/// Build metadata from one class mapping.
///
/// Keys that would change the schema but are not handled here, such as
/// associations or indexes, are rejected rather than skipped.
pub fn parse_entity(class_name: &str, mapping: &Mapping) -> OrmResult<EntityMetadata> {
    let error = |problem: String| OrmError::Mapping(format!("{}: {}", class_name, problem));
    check_keys(mapping, ENTITY_KEYS, "mapping").map_err(error)?;
    let mut metadata = EntityMetadata::new(class_name);

    if let Some(table) = mapping.get("table") {
        metadata.table_name = table
            .as_str()
            .ok_or_else(|| error("\"table\" must be a string".to_string()))?
            .to_string();
    }

    let ids = section(mapping, "id").map_err(error)?;
    let single_id = ids.len() == 1;
    for (name, field) in ids {
        let mut field = parse_field(name, field, &["generator"]).map_err(error)?;
        field.id = true;
        field.nullable = false;

        let strategy = generator_strategy(&field_options(name, mapping)).map_err(error)?;
        field.auto_increment = single_id
            && field.column_type.is_integer()
            && matches!(strategy.as_str(), "AUTO" | "IDENTITY");
        metadata.add_field(field)?;
    }

    for (name, field) in section(mapping, "fields").map_err(error)? {
        metadata.add_field(parse_field(name, field, &[]).map_err(error)?)?;
    }

    if metadata.fields.is_empty() {
        return Err(error("maps no fields".to_string()));
    }

    Ok(metadata)
}

fn section<'a>(mapping: &'a Mapping, key: &str) -> Result<Vec<(&'a str, &'a Yaml)>, String> {
    match mapping.get(key) {
        None | Some(Yaml::Null) => Ok(Vec::new()),
        Some(Yaml::Mapping(fields)) => fields
            .iter()
            .map(|(name, field)| {
                name.as_str()
                    .map(|name| (name, field))
                    .ok_or_else(|| format!("\"{}\" keys must be strings", key))
            })
            .collect(),
        Some(_) => Err(format!("\"{}\" must be a mapping", key)),
    }
}

fn field_options(name: &str, mapping: &Mapping) -> Mapping {
    mapping
        .get("id")
        .and_then(|ids| ids.get(name))
        .and_then(Yaml::as_mapping)
        .cloned()
        .unwrap_or_default()
}

fn generator_strategy(options: &Mapping) -> Result<String, String> {
    match options.get("generator") {
        None => Ok("NONE".to_string()),
        Some(generator) => Ok(generator
            .get("strategy")
            .and_then(Yaml::as_str)
            .unwrap_or("AUTO")
            .to_ascii_uppercase()),
    }
}

fn check_keys(mapping: &Mapping, allowed: &[&str], context: &str) -> Result<(), String> {
    for key in mapping.keys() {
        match key.as_str() {
            Some(key) if allowed.contains(&key) => {}
            Some(key) => return Err(format!("unsupported key \"{}\" in {}", key, context)),
            None => return Err(format!("{} keys must be strings", context)),
        }
    }
    Ok(())
}

fn parse_field(name: &str, field: &Yaml, extra_keys: &[&str]) -> Result<FieldMapping, String> {
    let empty = Mapping::new();
    let options = match field {
        Yaml::Null => &empty,
        Yaml::Mapping(options) => options,
        _ => return Err(format!("field \"{}\" must be a mapping", name)),
    };

    let context = format!("field \"{}\"", name);
    let allowed: Vec<&str> = FIELD_KEYS.iter().chain(extra_keys).copied().collect();
    check_keys(options, &allowed, &context)?;
    match options.get("options") {
        None | Some(Yaml::Null) => {}
        Some(Yaml::Mapping(field_options)) => {
            check_keys(field_options, FIELD_OPTION_KEYS, &format!("{} options", context))?
        }
        Some(_) => return Err(format!("{}: \"options\" must be a mapping", context)),
    }

    let type_name = options.get("type").and_then(Yaml::as_str).unwrap_or("string");
    let column_type = ColumnType::parse(type_name)
        .ok_or_else(|| format!("field \"{}\" has unknown type \"{}\"", name, type_name))?;

    let mut mapping = FieldMapping::new(name, column_type);
    if let Some(column) = options.get("column") {
        mapping.column_name = column
            .as_str()
            .ok_or_else(|| format!("field \"{}\": \"column\" must be a string", name))?
            .to_string();
    }

    mapping.length = number(options, "length", name)?;
    mapping.precision = number(options, "precision", name)?;
    mapping.scale = number(options, "scale", name)?;
    mapping.nullable = flag(options, "nullable", name)?;
    mapping.unique = flag(options, "unique", name)?;

    if let Some(default) = options.get("options").and_then(|o| o.get("default")) {
        let default: Value = serde_yaml::from_value(default.clone())
            .map_err(|e| format!("field \"{}\": {}", name, e))?;
        if !default.is_null() {
            mapping.default = Some(default);
        }
    }

    Ok(mapping)
}

fn number(options: &Mapping, key: &str, field: &str) -> Result<Option<u32>, String> {
    match options.get(key) {
        None | Some(Yaml::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| format!("field \"{}\": \"{}\" must be a positive integer", field, key)),
    }
}

fn flag(options: &Mapping, key: &str, field: &str) -> Result<bool, String> {
    match options.get(key) {
        None | Some(Yaml::Null) => Ok(false),
        Some(Yaml::Bool(value)) => Ok(*value),
        Some(_) => Err(format!("field \"{}\": \"{}\" must be a boolean", field, key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCT: &str = r#"
App\Entity\Product:
  type: entity
  table: products
  id:
    id:
      type: integer
      generator: { strategy: AUTO }
  fields:
    name: { type: string, length: 120 }
    price: { type: decimal, precision: 10, scale: 2, nullable: true }
    sku: { column: stock_unit, unique: true }
    active: { type: boolean, options: { default: true } }
"#;

    fn mapping(yaml: &str, class: &str) -> Mapping {
        let document: Mapping = serde_yaml::from_str(yaml).unwrap();
        document.get(class).unwrap().as_mapping().unwrap().clone()
    }

    #[test]
    fn test_parse_entity() {
        let metadata = parse_entity("App\\Entity\\Product", &mapping(PRODUCT, "App\\Entity\\Product")).unwrap();
        assert_eq!(metadata.table_name, "products");
        assert_eq!(metadata.fields.len(), 5);

        let id = metadata.field("id").unwrap();
        assert!(id.id && id.auto_increment && !id.nullable);

        let price = metadata.field("price").unwrap();
        assert_eq!(price.column_type, ColumnType::Decimal);
        assert_eq!((price.precision, price.scale), (Some(10), Some(2)));
        assert!(price.nullable);

        let sku = metadata.column("stock_unit").unwrap();
        assert_eq!(sku.column_type, ColumnType::String);
        assert!(sku.unique);

        assert_eq!(metadata.field("active").unwrap().default, Some(Value::Bool(true)));
    }

    #[test]
    fn test_default_table_is_short_class_name() {
        let yaml = "App\\Entity\\Order:\n  type: entity\n  id:\n    id: { type: integer }\n";
        let metadata = parse_entity("App\\Entity\\Order", &mapping(yaml, "App\\Entity\\Order")).unwrap();
        assert_eq!(metadata.table_name, "Order");
        assert!(!metadata.fields[0].auto_increment);
    }

    #[test]
    fn test_composite_identifier_is_not_generated() {
        let yaml = r#"
App\Entity\Tagging:
  type: entity
  id:
    post_id: { type: integer, generator: { strategy: AUTO } }
    tag_id: { type: integer }
"#;
        let metadata = parse_entity("App\\Entity\\Tagging", &mapping(yaml, "App\\Entity\\Tagging")).unwrap();
        assert_eq!(metadata.identifier().count(), 2);
        assert!(metadata.fields.iter().all(|f| !f.auto_increment));
    }

    #[test]
    fn test_invalid_mappings() {
        let cases = [
            "A:\n  fields:\n    x: { type: money }\n",
            "A:\n  fields:\n    x: { length: -1 }\n",
            "A:\n  fields:\n    x: { nullable: 'yes' }\n",
            "A:\n  fields:\n    x: { column: y }\n    y: {}\n",
            "A:\n  table: [a]\n  fields:\n    x: {}\n",
            "A:\n  type: entity\n",
        ];
        for case in cases {
            assert!(
                matches!(parse_entity("A", &mapping(case, "A")), Err(OrmError::Mapping(_))),
                "{} should be rejected",
                case
            );
        }
    }

    #[test]
    fn test_unsupported_keys_are_rejected() {
        let cases = [
            ("A:\n  id:\n    id: { type: integer }\n  manyToOne:\n    customer: { joinColumn: { name: customer_id } }\n", "manyToOne"),
            ("A:\n  fields:\n    x: {}\n  uniqueConstraints:\n    sku_idx: { columns: [x] }\n", "uniqueConstraints"),
            ("A:\n  fields:\n    x: {}\n  feilds:\n    y: {}\n", "feilds"),
            ("A:\n  fields:\n    x: { type: string, lenght: 10 }\n", "lenght"),
            ("A:\n  fields:\n    x: { generator: { strategy: AUTO } }\n", "generator"),
            ("A:\n  fields:\n    x: { options: { unsigned: true } }\n", "unsigned"),
        ];
        for (case, key) in cases {
            match parse_entity("A", &mapping(case, "A")) {
                Err(OrmError::Mapping(message)) => assert!(message.contains(key), "{}", message),
                other => panic!("{} should be rejected, got {:?}", key, other),
            }
        }

        let yaml = "A:\n  type: entity\n  repositoryClass: App\\Repository\\A\n  fields:\n    x: { options: { default: 1 } }\n";
        assert!(parse_entity("A", &mapping(yaml, "A")).is_ok());
    }

    #[test]
    fn test_driver_scans_once() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("Product.orm.yml"), PRODUCT).unwrap();
        let driver = YamlDriver::new(vec![dir.path().to_path_buf()]);

        assert_eq!(driver.all_class_names().unwrap(), vec!["App\\Entity\\Product"]);
        fs::remove_file(dir.path().join("Product.orm.yml")).unwrap();

        let metadata = driver.load_metadata("App\\Entity\\Product").unwrap();
        assert_eq!(metadata.table_name, "products");
        assert!(YamlDriver::new(vec![dir.path().to_path_buf()]).all_class_names().unwrap().is_empty());
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("App\\Entity\\Product"), "Product");
        assert_eq!(short_name("Product"), "Product");
        assert_eq!(short_name("app::entity::Product"), "Product");
    }
}
