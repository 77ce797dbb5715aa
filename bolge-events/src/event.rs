//! Event definitions and handler traits

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use uuid::Uuid;

use crate::EventDispatcher;

/// Event trait
///
/// Anything dispatched through an [`EventDispatcher`] implements this.
pub trait Event: Send + Sync + Debug + 'static {
    /// Get event name
    fn event_name(&self) -> &str;

    /// Get event metadata
    fn metadata(&self) -> &EventMetadata;

    /// Cast to Any for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Get event ID
    fn event_id(&self) -> Uuid {
        self.metadata().id
    }

    /// Get event timestamp
    fn timestamp(&self) -> DateTime<Utc> {
        self.metadata().timestamp
    }
}

/// Base event metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Unique event ID
    pub id: Uuid,

    /// Event name
    pub name: String,

    /// Timestamp when event was created
    pub timestamp: DateTime<Utc>,
}

impl EventMetadata {
    /// Create new event metadata
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Event handler trait
#[async_trait]
pub trait EventHandler<E: Event>: Send + Sync {
    /// Handle the event
    async fn handle(&self, event: &E) -> Result<(), EventHandlerError>;
}

#[async_trait]
impl<E: Event, H: EventHandler<E> + ?Sized> EventHandler<E> for Arc<H> {
    async fn handle(&self, event: &E) -> Result<(), EventHandlerError> {
        (**self).handle(event).await
    }
}

/// Event handler error
#[derive(Debug, thiserror::Error)]
pub enum EventHandlerError {
    #[error("Handler failed: {0}")]
    HandlerFailed(String),

    #[error("Event type mismatch: expected {0}")]
    TypeMismatch(&'static str),

    #[error(transparent)]
    Source(Box<dyn std::error::Error + Send + Sync>),
}

impl EventHandlerError {
    /// Wrap an arbitrary error so it can be recovered by the dispatching side.
    pub fn from_source<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        EventHandlerError::Source(Box::new(error))
    }

    /// Unwrap into a boxed error.
    pub fn into_source(self) -> Box<dyn std::error::Error + Send + Sync> {
        match self {
            EventHandlerError::Source(source) => source,
            other => Box::new(other),
        }
    }
}

/// Type-erased event handler
#[async_trait]
pub trait DynEventHandler: Send + Sync {
    /// Handle event (type-erased)
    async fn handle_dyn(&self, event: &dyn Event) -> Result<(), EventHandlerError>;
}

/// Wrapper for typed event handlers
pub struct TypedEventHandler<E: Event, H: EventHandler<E>> {
    handler: H,
    _phantom: PhantomData<fn(&E)>,
}

impl<E: Event, H: EventHandler<E>> TypedEventHandler<E, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

#[async_trait]
impl<E: Event, H: EventHandler<E>> DynEventHandler for TypedEventHandler<E, H> {
    async fn handle_dyn(&self, event: &dyn Event) -> Result<(), EventHandlerError> {
        match event.as_any().downcast_ref::<E>() {
            Some(typed_event) => self.handler.handle(typed_event).await,
            None => Err(EventHandlerError::TypeMismatch(std::any::type_name::<E>())),
        }
    }
}

/// Handler backed by a synchronous closure.
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<E, F> EventHandler<E> for FnHandler<F>
where
    E: Event,
    F: Fn(&E) -> Result<(), EventHandlerError> + Send + Sync,
{
    async fn handle(&self, event: &E) -> Result<(), EventHandlerError> {
        (self.f)(event)
    }
}

/// A component that attaches one or more handlers to a dispatcher.
///
/// Subscribers receive themselves as an `Arc` so they can register clones of
/// it for several event types.
pub trait EventSubscriber: Send + Sync + 'static {
    fn subscribe(self: Arc<Self>, dispatcher: &EventDispatcher);
}
