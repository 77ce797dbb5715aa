// Request dispatch: pre-handle event, kernel, soft-404 collapse

use crate::error::Result;
use crate::services::ROUTES_PARAMETER;
use bolge_core::{
    Container, DispatchOutcome, HttpKernel, HttpRequest, PreHandleEvent, RequestContext, RouteTable,
};
use bolge_events::EventDispatcher;
use std::sync::Arc;
use tracing::{debug, warn};

/// Runs one request through the kernel of a compiled container.
///
/// The kernel gets its own dispatcher carrying the router listener; the
/// container's `event_dispatcher` only sees the pre-handle event.
#[derive(Debug, Clone)]
pub struct RequestDispatcher {
    events: Arc<EventDispatcher>,
    kernel: HttpKernel,
    dev_mode: bool,
}

impl RequestDispatcher {
    /// Dispatcher over the route table stored in the container
    pub fn new(container: &Container, events: Arc<EventDispatcher>, dev_mode: bool) -> Result<Self> {
        let routes = container.parameter::<RouteTable>(ROUTES_PARAMETER)?;
        let kernel = HttpKernel::with_router(container.clone(), routes, RequestContext::default());

        Ok(Self {
            events,
            kernel,
            dev_mode,
        })
    }

    pub fn kernel(&self) -> &HttpKernel {
        &self.kernel
    }

    /// Dispatch `request`.
    ///
    /// A pre-handle listener that sets a response answers the request and
    /// the kernel is skipped. Kernel failures are returned as outcomes, not
    /// errors; only a failing pre-handle fan-out is an error.
    pub async fn dispatch(&self, request: &HttpRequest) -> Result<DispatchOutcome> {
        let event = PreHandleEvent::new(request.clone());
        self.events.dispatch(&event).await?;

        if let Some(response) = event.take_response() {
            debug!(path = %request.path, "Request answered by a pre-handle listener");
            return Ok(DispatchOutcome::Handled(response));
        }

        let outcome = self.kernel.dispatch(request.clone()).await;
        self.report(request, &outcome);
        Ok(outcome)
    }

    fn report(&self, request: &HttpRequest, outcome: &DispatchOutcome) {
        let kind = match outcome {
            DispatchOutcome::Handled(response) => {
                debug!(method = %request.method, path = %request.path, status = response.status, "Request handled");
                return;
            }
            DispatchOutcome::Unmatched(_) => "unmatched",
            DispatchOutcome::Failed(_) => "failed",
        };

        if let Some(err) = outcome.error() {
            if self.dev_mode {
                warn!(method = %request.method, path = %request.path, outcome = kind, error = %err, "Request not handled");
            } else {
                debug!(method = %request.method, path = %request.path, outcome = kind, error = %err, "Request not handled");
            }
        }
    }
}
