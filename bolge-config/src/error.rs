// Error types for configuration loading

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration key not found: {0}")]
    KeyNotFound(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid route definition: {0}")]
    InvalidRoute(String),

    #[error("Invalid service definition: {0}")]
    InvalidService(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Environment error: {0}")]
    EnvError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] bolge_core::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
