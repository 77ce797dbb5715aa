//! Event dispatcher implementation

use crate::event::{DynEventHandler, Event, EventHandler, EventHandlerError, EventSubscriber, TypedEventHandler};
use dashmap::DashMap;
use std::any::TypeId;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Synchronous fan-out dispatcher with one channel per event type.
#[derive(Clone)]
pub struct EventDispatcher {
    /// Handlers registered for each event type, in subscription order
    handlers: Arc<DashMap<TypeId, Vec<Arc<dyn DynEventHandler>>>>,

    /// Configuration
    config: Arc<DispatcherConfig>,
}

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Keep calling the remaining handlers after one fails
    pub continue_on_error: bool,

    /// Enable dispatch logging
    pub enable_logging: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            continue_on_error: true,
            enable_logging: true,
        }
    }
}

impl EventDispatcher {
    /// Create new dispatcher
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    /// Create dispatcher with custom config
    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            handlers: Arc::new(DashMap::new()),
            config: Arc::new(config),
        }
    }

    pub fn builder() -> EventDispatcherBuilder {
        EventDispatcherBuilder::new()
    }

    /// Subscribe a handler to an event type
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let dispatcher = EventDispatcher::new();
    /// dispatcher.subscribe::<BootEvent, _>(MyListener::new());
    /// ```
    pub fn subscribe<E, H>(&self, handler: H)
    where
        E: Event,
        H: EventHandler<E> + 'static,
    {
        let type_id = TypeId::of::<E>();
        let handler: Arc<dyn DynEventHandler> = Arc::new(TypedEventHandler::<E, H>::new(handler));

        self.handlers.entry(type_id).or_default().push(handler);

        if self.config.enable_logging {
            debug!(event = std::any::type_name::<E>(), "Subscribed event handler");
        }
    }

    /// Let a subscriber attach its handlers.
    pub fn add_subscriber(&self, subscriber: Arc<dyn EventSubscriber>) {
        subscriber.subscribe(self);
    }

    /// Dispatch an event to every handler of its type, in subscription order.
    ///
    /// With `continue_on_error` a failing handler is logged and skipped;
    /// otherwise the first failure aborts the fan-out and is returned.
    pub async fn dispatch<E: Event>(&self, event: &E) -> Result<(), DispatchError> {
        let type_id = TypeId::of::<E>();

        // Clone the list so no map guard is held across an await point
        let handlers = match self.handlers.get(&type_id) {
            Some(handlers) => handlers.clone(),
            None => {
                if self.config.enable_logging {
                    trace!(event = event.event_name(), "No handlers registered");
                }
                return Ok(());
            }
        };

        if self.config.enable_logging {
            debug!(
                event = event.event_name(),
                id = %event.event_id(),
                handlers = handlers.len(),
                "Dispatching event"
            );
        }

        for handler in handlers.iter() {
            if let Err(e) = handler.handle_dyn(event).await {
                if !self.config.continue_on_error {
                    return Err(DispatchError::HandlerFailed {
                        event: event.event_name().to_string(),
                        source: e,
                    });
                }
                error!(event = event.event_name(), error = %e, "Event handler failed");
            }
        }

        Ok(())
    }

    /// Remove all handlers for an event type
    pub fn unsubscribe<E: Event>(&self) {
        self.handlers.remove(&TypeId::of::<E>());
    }

    /// Clear all handlers
    pub fn clear(&self) {
        self.handlers.clear();
    }

    /// Get handler count for an event type
    pub fn handler_count<E: Event>(&self) -> usize {
        self.handlers
            .get(&TypeId::of::<E>())
            .map(|h| h.len())
            .unwrap_or(0)
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("event_types", &self.handlers.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Dispatch errors
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Handler for event '{event}' failed: {source}")]
    HandlerFailed {
        event: String,
        #[source]
        source: EventHandlerError,
    },
}

impl DispatchError {
    /// Consume the error, returning the handler failure.
    pub fn into_handler_error(self) -> EventHandlerError {
        match self {
            DispatchError::HandlerFailed { source, .. } => source,
        }
    }
}

/// Event dispatcher builder
pub struct EventDispatcherBuilder {
    config: DispatcherConfig,
}

impl EventDispatcherBuilder {
    pub fn new() -> Self {
        Self {
            config: DispatcherConfig::default(),
        }
    }

    /// Enable/disable continue on error
    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.config.continue_on_error = enabled;
        self
    }

    /// Enable/disable logging
    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.config.enable_logging = enabled;
        self
    }

    pub fn build(self) -> EventDispatcher {
        EventDispatcher::with_config(self.config)
    }
}

impl Default for EventDispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
