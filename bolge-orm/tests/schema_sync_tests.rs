//! Integration tests for mapping discovery and schema synchronisation.

use bolge_orm::sea_orm::{ConnectionTrait, DbBackend, Statement};
use bolge_orm::*;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

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
"#;

const CUSTOMER: &str = r#"
App\Entity\Customer:
  type: entity
  id:
    id: { type: integer, generator: { strategy: IDENTITY } }
  fields:
    email: { type: string, unique: true }
"#;

const BASE: &str = r#"
App\Entity\Timestamped:
  type: mappedSuperclass
  fields:
    created_at: { type: datetime }
"#;

fn entity_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("Product.orm.yml"), PRODUCT).unwrap();
    fs::create_dir(dir.path().join("Sales")).unwrap();
    fs::write(dir.path().join("Sales/Customer.orm.yaml"), CUSTOMER).unwrap();
    fs::write(dir.path().join("Timestamped.orm.yml"), BASE).unwrap();
    fs::write(dir.path().join("README.txt"), "not a mapping").unwrap();
    dir
}

fn memory_params() -> ConnectionParams {
    ConnectionParams::new("pdo_sqlite", "", "", ":memory:", "")
}

fn entity_manager(dir: &TempDir, prefix: &str) -> EntityManager {
    let setup = OrmSetup::yaml_metadata_configuration([dir.path()], true);
    let events = OrmEventManager::new().with_listener(Arc::new(TablePrefix::new(prefix)));
    EntityManager::create(memory_params(), &setup, events).unwrap()
}

async fn tables(em: &EntityManager) -> Vec<String> {
    let conn = em.connection().await.unwrap();
    let rows = conn
        .query_all(Statement::from_string(
            DbBackend::Sqlite,
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        ))
        .await
        .unwrap();
    rows.iter().map(|row| row.try_get::<String>("", "name").unwrap()).collect()
}

#[test]
fn test_driver_discovers_entities_recursively() {
    let dir = entity_dir();
    let em = entity_manager(&dir, "wp_");

    assert_eq!(em.all_class_names().unwrap(), vec!["App\\Entity\\Customer", "App\\Entity\\Product"]);

    let product = em.class_metadata("App\\Entity\\Product").unwrap();
    assert_eq!(product.table_name, "wp_products");

    let customer = em.class_metadata("App\\Entity\\Customer").unwrap();
    assert_eq!(customer.table_name, "wp_Customer");
    assert!(customer.field("id").unwrap().auto_increment);

    assert!(matches!(em.class_metadata("App\\Entity\\Timestamped"), Err(OrmError::Mapping(_))));
    assert!(!em.is_connected());
}

#[test]
fn test_missing_entity_directory() {
    let dir = TempDir::new().unwrap();
    let setup = OrmSetup::yaml_metadata_configuration([dir.path().join("App/Entity")], false);
    let em = EntityManager::create(memory_params(), &setup, OrmEventManager::new()).unwrap();

    assert!(matches!(em.all_metadata(), Err(OrmError::Mapping(_))));
}

#[test]
fn test_duplicate_class_is_rejected() {
    let dir = entity_dir();
    fs::write(dir.path().join("Copy.orm.yml"), PRODUCT).unwrap();
    let em = entity_manager(&dir, "");

    assert!(matches!(em.all_class_names(), Err(OrmError::Mapping(_))));
}

#[test]
fn test_invalid_connection_params() {
    let dir = entity_dir();
    let setup = OrmSetup::yaml_metadata_configuration([dir.path()], false);

    let unknown = ConnectionParams::new("oci8", "u", "p", "db", "localhost");
    assert!(matches!(
        EntityManager::create(unknown, &setup, OrmEventManager::new()),
        Err(OrmError::Config(_))
    ));

    let no_host = ConnectionParams::new("pdo_mysql", "u", "p", "db", "");
    assert!(matches!(
        EntityManager::create(no_host, &setup, OrmEventManager::new()),
        Err(OrmError::Config(_))
    ));
}

#[tokio::test]
async fn test_update_schema_creates_tables_once() {
    let dir = entity_dir();
    let em = entity_manager(&dir, "wp_");
    let metadata = em.all_metadata().unwrap();
    let tool = SchemaTool::new(&em);

    let executed = tool.update_schema(&metadata).await.unwrap();
    assert_eq!(executed.len(), 2);
    assert!(em.is_connected());
    assert_eq!(tables(&em).await, vec!["wp_Customer", "wp_products"]);

    assert!(tool.update_schema_sql(&metadata).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_schema_adds_new_columns() {
    let dir = entity_dir();
    let em = entity_manager(&dir, "wp_");
    let tool = SchemaTool::new(&em);
    tool.update_schema(&em.all_metadata().unwrap()).await.unwrap();

    let mut metadata = em.all_metadata().unwrap();
    let product = metadata
        .iter_mut()
        .find(|m| m.table_name == "wp_products")
        .unwrap();
    let mut stock = FieldMapping::new("stock", ColumnType::Integer);
    stock.nullable = true;
    product.fields.push(stock);

    let statements = tool.update_schema_sql(&metadata).await.unwrap();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].starts_with("ALTER TABLE \"wp_products\" ADD COLUMN \"stock\""));

    tool.execute(&statements).await.unwrap();
    let live = LiveSchema::introspect(em.connection().await.unwrap()).await.unwrap();
    assert!(live.has_column("wp_products", "stock"));
    assert!(live.has_column("WP_PRODUCTS", "NAME"));
}

#[tokio::test]
async fn test_failed_statement_names_the_sql() {
    let dir = entity_dir();
    let em = entity_manager(&dir, "");
    let tool = SchemaTool::new(&em);

    let statements = vec![
        "CREATE TABLE first (id integer)".to_string(),
        "ALTER TABLE missing ADD COLUMN x integer".to_string(),
    ];
    let err = tool.execute(&statements).await.unwrap_err();
    assert!(matches!(&err, OrmError::Schema(message) if message.contains("missing")));

    // Statements before the failure stay applied.
    assert_eq!(tables(&em).await, vec!["first"]);
}

#[tokio::test]
async fn test_not_null_columns_added_to_populated_table() {
    let dir = entity_dir();
    let em = entity_manager(&dir, "wp_");
    let tool = SchemaTool::new(&em);
    tool.update_schema(&em.all_metadata().unwrap()).await.unwrap();

    let conn = em.connection().await.unwrap();
    conn.execute_unprepared("INSERT INTO wp_products (name) VALUES ('lamp')")
        .await
        .unwrap();

    let mut metadata = em.all_metadata().unwrap();
    let product = metadata
        .iter_mut()
        .find(|m| m.table_name == "wp_products")
        .unwrap();
    product.fields.push(FieldMapping::new("sku", ColumnType::String));
    product.fields.push(FieldMapping::new("in_stock", ColumnType::Boolean));
    product.fields.push(FieldMapping::new("description", ColumnType::Text));

    let executed = tool.update_schema(&metadata).await.unwrap();
    assert_eq!(executed.len(), 3);

    let row = conn
        .query_one(Statement::from_string(
            DbBackend::Sqlite,
            "SELECT name, sku, description FROM wp_products",
        ))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.try_get::<String>("", "name").unwrap(), "lamp");
    assert_eq!(row.try_get::<String>("", "sku").unwrap(), "");
    assert_eq!(row.try_get::<Option<String>>("", "description").unwrap(), None);
}
