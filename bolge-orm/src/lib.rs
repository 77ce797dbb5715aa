//! # Bolge ORM
//!
//! Database layer of a Bolge plugin, built on SeaORM.
//!
//! ## Features
//!
//! - **YAML Mappings**: entity metadata read from `*.orm.yml` files
//! - **Table Prefixing**: metadata listeners rewrite table names on load
//! - **Lazy Connection**: the database is only reached on first use
//! - **Schema Sync**: forward-only diff of live tables against metadata
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bolge_orm::{ConnectionParams, EntityManager, OrmEventManager, OrmSetup, SchemaTool, TablePrefix};
//! use std::sync::Arc;
//!
//! let params = ConnectionParams::new("pdo_mysql", "wp", "secret", "wordpress", "localhost");
//! let setup = OrmSetup::yaml_metadata_configuration(["plugin/src/App/Entity"], true);
//! let events = OrmEventManager::new().with_listener(Arc::new(TablePrefix::new("wp_")));
//!
//! let em = EntityManager::create(params, &setup, events)?;
//! let metadata = em.all_metadata()?;
//! SchemaTool::new(&em).update_schema(&metadata).await?;
//! ```

pub mod config;
pub mod entity_manager;
pub mod error;
pub mod listener;
pub mod metadata;
pub mod schema;

pub use config::{ConnectionParams, OrmSetup};
pub use entity_manager::EntityManager;
pub use error::{OrmError, OrmResult};
pub use listener::{MetadataListener, OrmEventManager, TablePrefix};
pub use metadata::{ColumnType, EntityMetadata, FieldMapping, MetadataDriver, YamlDriver, parse_entity};
pub use schema::{LiveSchema, SchemaTool, diff_statements};

/// Re-export of the underlying SeaORM crate.
pub use sea_orm;
