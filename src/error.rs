// Error type of the bootstrap context

use bolge_config::ConfigError;
use bolge_events::DispatchError;
use bolge_orm::OrmError;
use thiserror::Error;

/// Errors surfaced by [`BolgeCore::boot`](crate::BolgeCore::boot) and
/// [`BolgeCore::plugin_activate`](crate::BolgeCore::plugin_activate).
///
/// Routing and controller failures never show up here; a request nothing
/// handles simply leaves the response empty.
#[derive(Error, Debug)]
pub enum BootError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] bolge_core::Error),

    #[error(transparent)]
    Orm(#[from] OrmError),

    #[error("Lifecycle event failed: {0}")]
    Event(#[from] DispatchError),

    #[error("plugin_activate() called before boot()")]
    NotBooted,
}

impl BootError {
    /// Whether a service lookup failed, e.g. the entity manager without
    /// database parameters.
    pub fn is_service_not_found(&self) -> bool {
        matches!(self, BootError::Core(err) if err.is_service_not_found())
    }
}

pub type Result<T> = std::result::Result<T, BootError>;
