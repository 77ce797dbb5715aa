//! Forward-only schema synchronisation.
//!
//! Compares the live database with entity metadata and emits the statements
//! that bring it up to date: `CREATE TABLE` for missing tables, then
//! `ALTER TABLE ... ADD COLUMN` for missing columns. Nothing is dropped or
//! altered in place.

use crate::entity_manager::EntityManager;
use crate::metadata::{ColumnType, EntityMetadata, FieldMapping};
use crate::{OrmError, OrmResult};
use sea_orm::{ConnectionTrait, DatabaseConnection, DbBackend, Statement};
use sea_query::{Alias, ColumnDef, Index, SimpleExpr, Table};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Tables and columns present in a database. Names compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSchema {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl LiveSchema {
    /// An empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a table.
    pub fn add_table(&mut self, table: &str) {
        self.tables.entry(table.to_lowercase()).or_default();
    }

    /// Record a column of a table.
    pub fn add_column(&mut self, table: &str, column: &str) {
        self.tables
            .entry(table.to_lowercase())
            .or_default()
            .insert(column.to_lowercase());
    }

    /// Whether the table exists.
    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(&table.to_lowercase())
    }

    /// Whether the column exists.
    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(&table.to_lowercase())
            .is_some_and(|columns| columns.contains(&column.to_lowercase()))
    }

    /// Number of tables.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Read table and column names from the database.
    ///
    /// Only names are read, so column types the mapping layer does not know
    /// (e.g. MySQL `enum`) need no special handling.
    pub async fn introspect(conn: &DatabaseConnection) -> OrmResult<Self> {
        let backend = conn.get_database_backend();
        let sql = match backend {
            DbBackend::Sqlite => {
                "SELECT m.name AS table_name, p.name AS column_name \
                 FROM sqlite_master m JOIN pragma_table_info(m.name) p \
                 WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'"
            }
            DbBackend::MySql => {
                "SELECT TABLE_NAME AS table_name, COLUMN_NAME AS column_name \
                 FROM information_schema.COLUMNS WHERE TABLE_SCHEMA = DATABASE()"
            }
            DbBackend::Postgres => {
                "SELECT table_name::text AS table_name, column_name::text AS column_name \
                 FROM information_schema.columns WHERE table_schema = current_schema()"
            }
        };

        let rows = conn.query_all(Statement::from_string(backend, sql)).await?;
        let mut schema = Self::new();
        for row in rows {
            let table: String = row.try_get("", "table_name")?;
            let column: String = row.try_get("", "column_name")?;
            schema.add_column(&table, &column);
        }

        debug!(tables = schema.table_count(), "Introspected database schema");
        Ok(schema)
    }
}

/// Statements that bring `live` up to date with `metadata`, in execution order.
pub fn diff_statements(backend: DbBackend, live: &LiveSchema, metadata: &[EntityMetadata]) -> Vec<String> {
    let mut creates = Vec::new();
    let mut alters = Vec::new();
    let mut created = BTreeSet::new();
    let mut added = BTreeSet::new();

    for entity in metadata {
        let table = entity.table_name.to_lowercase();
        if live.has_table(&entity.table_name) {
            for field in &entity.fields {
                if !live.has_column(&entity.table_name, &field.column_name)
                    && added.insert((table.clone(), field.column_name.to_lowercase()))
                {
                    alters.push(add_column_sql(backend, entity, field));
                }
            }
        } else if created.insert(table) {
            creates.push(create_table_sql(backend, entity));
        }
    }

    creates.extend(alters);
    creates
}

fn create_table_sql(backend: DbBackend, entity: &EntityMetadata) -> String {
    let mut statement = Table::create();
    statement.table(Alias::new(&entity.table_name));

    let ids: Vec<&FieldMapping> = entity.identifier().collect();
    for field in &entity.fields {
        let mut column = column_def(field);
        if field.id && ids.len() == 1 {
            column.primary_key();
            if field.auto_increment {
                column.auto_increment();
            }
        }
        if field.unique && !field.id {
            column.unique_key();
        }
        statement.col(&mut column);
    }

    if ids.len() > 1 {
        let mut primary_key = Index::create();
        for field in &ids {
            primary_key.col(Alias::new(&field.column_name));
        }
        statement.primary_key(&mut primary_key);
    }

    backend.build(&statement).sql
}

/// Existing rows need a value for a new column: a NOT NULL column without a
/// mapped default gets the zero value of its type. Text and JSON columns
/// cannot carry a literal default on MySQL, so they are added nullable.
fn add_column_sql(backend: DbBackend, entity: &EntityMetadata, field: &FieldMapping) -> String {
    let mut field = field.clone();
    if !field.nullable && field.default.is_none() {
        match zero_value(field.column_type) {
            Some(value) => field.default = Some(value),
            None => field.nullable = true,
        }
    }

    let mut column = column_def(&field);
    let mut statement = Table::alter();
    statement
        .table(Alias::new(&entity.table_name))
        .add_column(&mut column);

    backend.build(&statement).sql
}

fn column_def(field: &FieldMapping) -> ColumnDef {
    let mut column = ColumnDef::new(Alias::new(&field.column_name));

    match field.column_type {
        ColumnType::Integer => column.integer(),
        ColumnType::SmallInt => column.small_integer(),
        ColumnType::BigInt => column.big_integer(),
        ColumnType::String => column.string_len(field.length.unwrap_or(255)),
        ColumnType::Text => column.text(),
        ColumnType::Boolean => column.boolean(),
        ColumnType::Float => column.double(),
        ColumnType::Decimal => {
            column.decimal_len(field.precision.unwrap_or(10), field.scale.unwrap_or(0))
        }
        ColumnType::Date => column.date(),
        ColumnType::DateTime => column.date_time(),
        ColumnType::Time => column.time(),
        ColumnType::Json => column.json(),
        ColumnType::Guid => column.char_len(36),
    };

    if field.nullable && !field.id {
        column.null();
    } else {
        column.not_null();
    }

    if let Some(default) = field.default.as_ref().and_then(default_expr) {
        column.default(default);
    }

    column
}

fn zero_value(column_type: ColumnType) -> Option<Value> {
    match column_type {
        ColumnType::Integer
        | ColumnType::SmallInt
        | ColumnType::BigInt
        | ColumnType::Float
        | ColumnType::Decimal => Some(Value::from(0)),
        ColumnType::String | ColumnType::Guid => Some(Value::from("")),
        ColumnType::Boolean => Some(Value::Bool(false)),
        ColumnType::Date => Some(Value::from("1970-01-01")),
        ColumnType::DateTime => Some(Value::from("1970-01-01 00:00:00")),
        ColumnType::Time => Some(Value::from("00:00:00")),
        ColumnType::Text | ColumnType::Json => None,
    }
}

fn default_expr(value: &Value) -> Option<SimpleExpr> {
    match value {
        Value::Bool(b) => Some((*b).into()),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(i.into()),
            None => n.as_f64().map(Into::into),
        },
        Value::String(s) => Some(s.clone().into()),
        _ => None,
    }
}

/// Runs the schema diff of an entity manager against its database.
#[derive(Debug)]
pub struct SchemaTool<'a> {
    em: &'a EntityManager,
}

impl<'a> SchemaTool<'a> {
    /// Schema tool for `em`.
    pub fn new(em: &'a EntityManager) -> Self {
        Self { em }
    }

    /// Statements needed to bring the database up to date with `metadata`.
    pub async fn update_schema_sql(&self, metadata: &[EntityMetadata]) -> OrmResult<Vec<String>> {
        let conn = self.em.connection().await?;
        let live = LiveSchema::introspect(conn).await?;
        Ok(diff_statements(self.em.backend(), &live, metadata))
    }

    /// Execute statements one by one, in order and without a transaction.
    /// Statements that already ran stay applied when a later one fails.
    pub async fn execute(&self, statements: &[String]) -> OrmResult<()> {
        let conn = self.em.connection().await?;
        for sql in statements {
            debug!(sql = %sql, "Executing schema statement");
            conn.execute_unprepared(sql)
                .await
                .map_err(|e| OrmError::Schema(format!("{}: {}", sql, e)))?;
        }
        Ok(())
    }

    /// Compute and execute the update. Returns the executed statements.
    pub async fn update_schema(&self, metadata: &[EntityMetadata]) -> OrmResult<Vec<String>> {
        let statements = self.update_schema_sql(metadata).await?;
        self.execute(&statements).await?;
        info!(statements = statements.len(), "Database schema updated");
        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(table: &str) -> EntityMetadata {
        let mut id = FieldMapping::new("id", ColumnType::Integer);
        id.id = true;
        id.auto_increment = true;

        let mut name = FieldMapping::new("name", ColumnType::String);
        name.length = Some(120);

        let mut note = FieldMapping::new("note", ColumnType::Text);
        note.nullable = true;

        let mut metadata = EntityMetadata::new("App\\Entity\\Product");
        metadata.table_name = table.to_string();
        metadata.fields = vec![id, name, note];
        metadata
    }

    #[test]
    fn test_missing_table_is_created() {
        let statements = diff_statements(DbBackend::Sqlite, &LiveSchema::new(), &[product("wp_products")]);
        assert_eq!(statements.len(), 1);

        let sql = &statements[0];
        assert!(sql.starts_with("CREATE TABLE \"wp_products\""), "{}", sql);
        assert!(sql.contains("PRIMARY KEY AUTOINCREMENT"), "{}", sql);
        assert!(sql.contains("\"name\" varchar(120) NOT NULL"), "{}", sql);
        assert!(sql.contains("\"note\" text NULL"), "{}", sql);
    }

    #[test]
    fn test_missing_columns_are_added() {
        let mut live = LiveSchema::new();
        live.add_column("WP_PRODUCTS", "id");
        live.add_column("wp_products", "name");

        let statements = diff_statements(DbBackend::MySql, &live, &[product("wp_products")]);
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("ALTER TABLE `wp_products` ADD COLUMN `note`"), "{}", statements[0]);
    }

    #[test]
    fn test_up_to_date_schema_needs_nothing() {
        let mut live = LiveSchema::new();
        for column in ["id", "name", "note", "legacy"] {
            live.add_column("wp_products", column);
        }
        live.add_table("unrelated");

        assert!(diff_statements(DbBackend::Postgres, &live, &[product("wp_products")]).is_empty());
    }

    #[test]
    fn test_creates_come_before_alters() {
        let mut live = LiveSchema::new();
        live.add_column("a", "id");

        let statements = diff_statements(DbBackend::Sqlite, &live, &[product("a"), product("b")]);
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with("CREATE TABLE \"b\""));
        assert!(statements[1].starts_with("ALTER TABLE \"a\""));
        assert!(statements[2].starts_with("ALTER TABLE \"a\""));
    }

    #[test]
    fn test_added_not_null_columns_get_a_default() {
        let mut live = LiveSchema::new();
        live.add_column("wp_products", "id");
        live.add_column("wp_products", "note");

        let mut sku = FieldMapping::new("sku", ColumnType::String);
        let mut active = FieldMapping::new("active", ColumnType::Boolean);
        active.default = Some(Value::Bool(true));
        let body = FieldMapping::new("body", ColumnType::Text);
        sku.length = Some(32);

        let mut metadata = product("wp_products");
        metadata.fields.extend([sku, active, body]);

        let statements = diff_statements(DbBackend::Sqlite, &live, &[metadata]);
        assert_eq!(statements.len(), 4);
        assert!(statements[0].contains("\"name\" varchar(120) NOT NULL DEFAULT ''"), "{}", statements[0]);
        assert!(statements[1].contains("\"sku\" varchar(32) NOT NULL DEFAULT ''"), "{}", statements[1]);
        assert!(statements[2].contains("\"active\" boolean NOT NULL DEFAULT"), "{}", statements[2]);
        assert!(statements[3].contains("\"body\" text NULL"), "{}", statements[3]);

        // Tables created from scratch keep the mapping as is
        let created = diff_statements(DbBackend::Sqlite, &LiveSchema::new(), &[product("t")]);
        assert!(!created[0].contains("DEFAULT"), "{}", created[0]);
    }

    #[test]
    fn test_shared_table_column_added_once() {
        let mut live = LiveSchema::new();
        live.add_column("wp_products", "id");
        live.add_column("wp_products", "name");

        let mut variant = product("WP_PRODUCTS");
        variant.class_name = "App\\Entity\\Variant".to_string();

        let statements = diff_statements(DbBackend::Sqlite, &live, &[product("wp_products"), variant]);
        assert_eq!(statements.len(), 1, "{:?}", statements);
        assert!(statements[0].contains("\"note\""));
    }

    #[test]
    fn test_composite_primary_key() {
        let mut post = FieldMapping::new("post_id", ColumnType::Integer);
        post.id = true;
        let mut tag = FieldMapping::new("tag_id", ColumnType::Integer);
        tag.id = true;

        let mut metadata = EntityMetadata::new("Tagging");
        metadata.fields = vec![post, tag];

        let statements = diff_statements(DbBackend::Sqlite, &LiveSchema::new(), &[metadata]);
        assert!(statements[0].contains("PRIMARY KEY (\"post_id\", \"tag_id\")"), "{}", statements[0]);
    }
}
