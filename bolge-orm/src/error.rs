//! Error types for the ORM layer.

use thiserror::Error;

/// Errors raised while configuring the ORM, reading mappings or syncing the schema.
#[derive(Error, Debug)]
pub enum OrmError {
    /// Invalid connection parameters or setup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The database could not be reached.
    #[error("Connection error: {0}")]
    Connection(String),

    /// An entity mapping file is missing or malformed.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Database error from SeaORM.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// A schema statement failed.
    #[error("Schema error: {0}")]
    Schema(String),
}

/// Result type alias for ORM operations.
pub type OrmResult<T> = Result<T, OrmError>;
