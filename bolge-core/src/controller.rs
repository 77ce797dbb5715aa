// Controllers and controller resolution

use crate::logging::trace;
use crate::{Container, Error, HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::sync::Arc;

/// Handles a request routed to it.
///
/// `action` is the part after `::` in the `_controller` attribute, if any.
/// Return [`Error::NotFound`] to report that nothing exists at this URL.
#[async_trait]
pub trait Controller: Send + Sync {
    async fn call(&self, action: Option<&str>, request: HttpRequest) -> Result<HttpResponse, Error>;
}

/// Answers its default action with an empty 200 response
#[derive(Debug, Clone, Default)]
pub struct DefaultController;

impl DefaultController {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Controller for DefaultController {
    async fn call(&self, action: Option<&str>, request: HttpRequest) -> Result<HttpResponse, Error> {
        match action {
            None | Some("default_action") | Some("defaultAction") => Ok(HttpResponse::ok()),
            Some(other) => Err(Error::NotFound(format!(
                "action \"{}\" for {}",
                other, request.path
            ))),
        }
    }
}

/// Splits a controller reference into service id and action.
///
/// Accepts `service`, `service::action` and the short `service:action`.
pub fn parse_controller(reference: &str) -> Result<(&str, Option<&str>), Error> {
    let (id, action) = match reference.split_once("::") {
        Some((id, action)) => (id, Some(action)),
        None => match reference.split_once(':') {
            Some((id, action)) => (id, Some(action)),
            None => (reference, None),
        },
    };

    if id.is_empty() || action.is_some_and(str::is_empty) {
        return Err(Error::InvalidController(reference.to_string()));
    }
    Ok((id, action))
}

/// Resolves `_controller` references to controllers living in the container
#[derive(Debug, Clone)]
pub struct ControllerResolver {
    container: Container,
}

impl ControllerResolver {
    pub fn new(container: Container) -> Self {
        Self { container }
    }

    /// Look up the controller for a request.
    ///
    /// Returns the controller and the action to call. A reference to an
    /// unknown service is `ControllerNotFound`; a service that is not a
    /// controller is `InvalidController`.
    pub fn resolve<'r>(
        &self,
        request: &'r HttpRequest,
    ) -> Result<(Arc<dyn Controller>, Option<&'r str>), Error> {
        let reference = request
            .controller()
            .ok_or_else(|| Error::ControllerNotFound(format!("no controller for {}", request.path)))?;

        let (id, action) = parse_controller(reference)?;
        trace!(controller = id, action = ?action, "Resolving controller");

        if !self.container.has(id) {
            return Err(Error::ControllerNotFound(id.to_string()));
        }

        let controller = self
            .container
            .get::<Arc<dyn Controller>>(id)
            .map_err(|err| match err {
                Error::DependencyInjection(_) => Error::InvalidController(id.to_string()),
                other => other,
            })?;

        Ok((Arc::clone(&*controller), action))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_controller() {
        assert_eq!(parse_controller("app.home").unwrap(), ("app.home", None));
        assert_eq!(
            parse_controller("app.home::index").unwrap(),
            ("app.home", Some("index"))
        );
        assert_eq!(
            parse_controller("app.home:index").unwrap(),
            ("app.home", Some("index"))
        );
        assert!(matches!(parse_controller("::index"), Err(Error::InvalidController(_))));
        assert!(matches!(parse_controller("app.home::"), Err(Error::InvalidController(_))));
    }

    #[tokio::test]
    async fn test_default_controller_actions() {
        let controller = DefaultController::new();
        let request = HttpRequest::get("/");

        let response = controller.call(None, request.clone()).await.unwrap();
        assert_eq!(response.status, 200);

        let response = controller
            .call(Some("default_action"), request.clone())
            .await
            .unwrap();
        assert_eq!(response.status, 200);

        let err = controller.call(Some("missing"), request).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
