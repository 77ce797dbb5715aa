// HTTP kernel: request event, routing listener, controller call

use crate::logging::{debug, trace};
use crate::{
    CONTROLLER_ATTRIBUTE, Container, ControllerResolver, Error, HttpRequest, HttpResponse,
    RequestContext, RouteTable, UrlMatcher,
};
use async_trait::async_trait;
use bolge_events::{
    Event, EventDispatcher, EventHandler, EventHandlerError, EventMetadata, EventSubscriber,
};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;

/// Dispatched by the kernel before resolving the controller.
///
/// Listeners may add request attributes or answer the request directly.
#[derive(Debug)]
pub struct RequestEvent {
    metadata: EventMetadata,
    request: Mutex<HttpRequest>,
    response: Mutex<Option<HttpResponse>>,
}

impl RequestEvent {
    pub const NAME: &'static str = "kernel.request";

    pub fn new(request: HttpRequest) -> Self {
        Self {
            metadata: EventMetadata::new(Self::NAME),
            request: Mutex::new(request),
            response: Mutex::new(None),
        }
    }

    /// Snapshot of the request as listeners have left it so far
    pub fn request(&self) -> HttpRequest {
        self.request.lock().clone()
    }

    pub fn with_request<R>(&self, f: impl FnOnce(&mut HttpRequest) -> R) -> R {
        f(&mut self.request.lock())
    }

    pub fn set_response(&self, response: HttpResponse) {
        *self.response.lock() = Some(response);
    }

    pub fn has_response(&self) -> bool {
        self.response.lock().is_some()
    }

    pub fn into_parts(self) -> (HttpRequest, Option<HttpResponse>) {
        (self.request.into_inner(), self.response.into_inner())
    }
}

impl Event for RequestEvent {
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

/// Matches the request against the route table and stores the result in
/// the request attributes.
#[derive(Debug, Clone)]
pub struct RouterListener {
    matcher: UrlMatcher,
}

impl RouterListener {
    pub fn new(matcher: UrlMatcher) -> Self {
        Self { matcher }
    }

    pub fn matcher(&self) -> &UrlMatcher {
        &self.matcher
    }
}

#[async_trait]
impl EventHandler<RequestEvent> for RouterListener {
    async fn handle(&self, event: &RequestEvent) -> Result<(), EventHandlerError> {
        if event.has_response() {
            return Ok(());
        }

        let request = event.request();
        if request.attributes.contains_key(CONTROLLER_ATTRIBUTE) {
            trace!(path = %request.path, "Request already routed");
            return Ok(());
        }

        let attributes = self
            .matcher
            .match_request(&request)
            .map_err(EventHandlerError::from_source)?;

        debug!(
            method = %request.method,
            path = %request.path,
            route = ?attributes.get(crate::ROUTE_ATTRIBUTE),
            "Matched route"
        );

        event.with_request(|request| request.attributes.extend(attributes));
        Ok(())
    }
}

impl EventSubscriber for RouterListener {
    fn subscribe(self: Arc<Self>, dispatcher: &EventDispatcher) {
        dispatcher.subscribe::<RequestEvent, _>(self);
    }
}

/// Turns a request into a response
#[derive(Debug, Clone)]
pub struct HttpKernel {
    dispatcher: EventDispatcher,
    resolver: ControllerResolver,
}

impl HttpKernel {
    /// Kernel over an existing dispatcher.
    ///
    /// Listener errors on the dispatcher abort the request only when it was
    /// built with `continue_on_error(false)`.
    pub fn new(dispatcher: EventDispatcher, resolver: ControllerResolver) -> Self {
        Self {
            dispatcher,
            resolver,
        }
    }

    /// Kernel with its own dispatcher and a router listener over `routes`
    pub fn with_router(container: Container, routes: Arc<RouteTable>, context: RequestContext) -> Self {
        let dispatcher = EventDispatcher::builder().continue_on_error(false).build();
        let listener = Arc::new(RouterListener::new(UrlMatcher::new(routes, context)));
        dispatcher.add_subscriber(listener);

        Self::new(dispatcher, ControllerResolver::new(container))
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Route the request and call its controller
    pub async fn handle(&self, request: HttpRequest) -> Result<HttpResponse, Error> {
        let event = RequestEvent::new(request);
        self.dispatcher.dispatch(&event).await?;

        let (request, response) = event.into_parts();
        if let Some(response) = response {
            trace!(path = %request.path, "Request answered by a kernel listener");
            return Ok(response);
        }

        let (controller, action) = self.resolver.resolve(&request)?;
        let action = action.map(str::to_string);
        controller.call(action.as_deref(), request).await
    }

    /// Like [`handle`](Self::handle), classifying the result
    pub async fn dispatch(&self, request: HttpRequest) -> DispatchOutcome {
        DispatchOutcome::from_result(self.handle(request).await)
    }
}

/// Result of running a request through the kernel
#[derive(Debug)]
pub enum DispatchOutcome {
    Handled(HttpResponse),
    /// No route, method not allowed, no controller, or the controller
    /// reported not-found
    Unmatched(Error),
    /// Any other error
    Failed(Error),
}

impl DispatchOutcome {
    pub fn from_result(result: Result<HttpResponse, Error>) -> Self {
        match result {
            Ok(response) => DispatchOutcome::Handled(response),
            Err(err) if err.is_not_found() => DispatchOutcome::Unmatched(err),
            Err(err) => DispatchOutcome::Failed(err),
        }
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, DispatchOutcome::Handled(_))
    }

    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            DispatchOutcome::Handled(response) => Some(response),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            DispatchOutcome::Handled(_) => None,
            DispatchOutcome::Unmatched(err) | DispatchOutcome::Failed(err) => Some(err),
        }
    }

    /// The response, or `None` for both kinds of failure
    pub fn into_response(self) -> Option<HttpResponse> {
        match self {
            DispatchOutcome::Handled(response) => Some(response),
            _ => None,
        }
    }
}
