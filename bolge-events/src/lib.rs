//! Typed event dispatching for Bolge.
//!
//! Every event type gets its own channel, keyed by its `TypeId`. Listeners
//! are invoked sequentially in subscription order, so a listener may rely
//! on the ones registered before it having finished.
//!
//! ```rust,ignore
//! use bolge_events::{EventDispatcher, FnHandler};
//!
//! let dispatcher = EventDispatcher::new();
//! dispatcher.subscribe::<BootEvent, _>(FnHandler::new(|event: &BootEvent| {
//!     println!("booted: {}", event.request().path);
//!     Ok(())
//! }));
//! dispatcher.dispatch(&BootEvent::new(request, None)).await?;
//! ```

pub mod dispatcher;
pub mod event;

pub use dispatcher::{DispatchError, DispatcherConfig, EventDispatcher, EventDispatcherBuilder};
pub use event::{
    DynEventHandler, Event, EventHandler, EventHandlerError, EventMetadata, EventSubscriber,
    FnHandler, TypedEventHandler,
};
