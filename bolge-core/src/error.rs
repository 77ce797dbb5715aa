// Error types for the Bolge kernel

use bolge_events::{DispatchError, EventHandlerError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Routing
    #[error("No route found for \"{0}\"")]
    RouteNotFound(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Invalid route: {0}")]
    InvalidRoute(String),

    #[error("Missing parameters: {0}")]
    MissingParameters(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // Service container
    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),

    #[error("Circular reference detected: {0}")]
    CircularReference(String),

    #[error("Dependency injection error: {0}")]
    DependencyInjection(String),

    #[error("Failed to create service \"{id}\": {message}")]
    ServiceCreation { id: String, message: String },

    // Controllers
    #[error("Controller not found: {0}")]
    ControllerNotFound(String),

    #[error("Invalid controller: {0}")]
    InvalidController(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Event listener error: {0}")]
    Event(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error means "nothing here handles the request".
    ///
    /// Covers unmatched routes, disallowed methods, unresolvable controllers
    /// and controllers reporting not-found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::RouteNotFound(_)
                | Error::MethodNotAllowed(_)
                | Error::ControllerNotFound(_)
                | Error::NotFound(_)
        )
    }

    pub fn is_service_not_found(&self) -> bool {
        matches!(self, Error::ServiceNotFound(_))
    }

    /// HTTP status code that best describes this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::RouteNotFound(_) | Error::ControllerNotFound(_) | Error::NotFound(_) => 404,
            Error::MethodNotAllowed(_) => 405,
            _ => 500,
        }
    }
}

impl From<EventHandlerError> for Error {
    fn from(err: EventHandlerError) -> Self {
        match err.into_source().downcast::<Error>() {
            Ok(error) => *error,
            Err(other) => Error::Event(other.to_string()),
        }
    }
}

impl From<DispatchError> for Error {
    fn from(err: DispatchError) -> Self {
        err.into_handler_error().into()
    }
}

pub type Result<T> = std::result::Result<T, Error>;
