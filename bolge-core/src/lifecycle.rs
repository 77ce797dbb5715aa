//! Plugin lifecycle events.
//!
//! Dispatched on the container's `event_dispatcher` service:
//!
//! - [`PreHandleEvent`] before the kernel sees a request; a listener may answer it
//! - [`BootEvent`] after every dispatch, whatever the outcome
//! - [`ActivateEvent`] after the schema has been synchronised on activation

use crate::{HttpRequest, HttpResponse};
use bolge_events::{Event, EventMetadata};
use parking_lot::Mutex;
use std::any::Any;

/// Fired once the request has gone through the kernel
#[derive(Debug)]
pub struct BootEvent {
    metadata: EventMetadata,
    request: HttpRequest,
    response: Option<HttpResponse>,
}

impl BootEvent {
    pub const NAME: &'static str = "bolge.boot";

    pub fn new(request: HttpRequest, response: Option<HttpResponse>) -> Self {
        Self {
            metadata: EventMetadata::new(Self::NAME),
            request,
            response,
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// `None` when nothing handled the request
    pub fn response(&self) -> Option<&HttpResponse> {
        self.response.as_ref()
    }

    pub fn into_parts(self) -> (HttpRequest, Option<HttpResponse>) {
        (self.request, self.response)
    }
}

impl Event for BootEvent {
    fn event_name(&self) -> &str {
        Self::NAME
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Fired before the kernel handles a request.
///
/// A listener that sets a response skips the kernel entirely.
#[derive(Debug)]
pub struct PreHandleEvent {
    metadata: EventMetadata,
    request: HttpRequest,
    response: Mutex<Option<HttpResponse>>,
}

impl PreHandleEvent {
    pub const NAME: &'static str = "bolge.http_kernel.request";

    pub fn new(request: HttpRequest) -> Self {
        Self {
            metadata: EventMetadata::new(Self::NAME),
            request,
            response: Mutex::new(None),
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn set_response(&self, response: HttpResponse) {
        *self.response.lock() = Some(response);
    }

    pub fn has_response(&self) -> bool {
        self.response.lock().is_some()
    }

    pub fn take_response(&self) -> Option<HttpResponse> {
        self.response.lock().take()
    }
}

impl Event for PreHandleEvent {
    fn event_name(&self) -> &str {
        Self::NAME
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Fired after plugin activation has updated the database schema
#[derive(Debug)]
pub struct ActivateEvent {
    metadata: EventMetadata,
}

impl ActivateEvent {
    pub const NAME: &'static str = "bolge.activate";

    pub fn new() -> Self {
        Self {
            metadata: EventMetadata::new(Self::NAME),
        }
    }
}

impl Default for ActivateEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl Event for ActivateEvent {
    fn event_name(&self) -> &str {
        Self::NAME
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let boot = BootEvent::new(HttpRequest::get("/"), None);
        assert_eq!(boot.event_name(), "bolge.boot");
        assert_eq!(boot.metadata().name, "bolge.boot");
        assert_eq!(PreHandleEvent::new(HttpRequest::get("/")).event_name(), "bolge.http_kernel.request");
        assert_eq!(ActivateEvent::new().event_name(), "bolge.activate");
    }

    #[test]
    fn test_pre_handle_response_slot() {
        let event = PreHandleEvent::new(HttpRequest::get("/maintenance"));
        assert!(!event.has_response());

        event.set_response(HttpResponse::text("down for maintenance").with_status(503));
        assert!(event.has_response());

        let response = event.take_response().unwrap();
        assert_eq!(response.status, 503);
        assert!(event.take_response().is_none());
    }

    #[test]
    fn test_boot_event_parts() {
        let event = BootEvent::new(HttpRequest::get("/a"), Some(HttpResponse::ok()));
        assert_eq!(event.request().path, "/a");
        assert_eq!(event.response().map(|r| r.status), Some(200));

        let (request, response) = event.into_parts();
        assert_eq!(request.path, "/a");
        assert!(response.is_some());
    }

    #[test]
    fn test_listener_answers_pre_handle() {
        use bolge_events::{EventDispatcher, FnHandler};

        let dispatcher = EventDispatcher::new();
        dispatcher.subscribe::<PreHandleEvent, _>(FnHandler::new(|event: &PreHandleEvent| {
            if event.request().path == "/maintenance" {
                event.set_response(HttpResponse::text("down").with_status(503));
            }
            Ok(())
        }));

        let event = PreHandleEvent::new(HttpRequest::get("/maintenance"));
        tokio_test::block_on(dispatcher.dispatch(&event)).unwrap();
        assert_eq!(event.take_response().map(|r| r.status), Some(503));

        let event = PreHandleEvent::new(HttpRequest::get("/shop"));
        tokio_test::block_on(dispatcher.dispatch(&event)).unwrap();
        assert!(!event.has_response());
    }
}
