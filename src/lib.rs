//! # Bolge
//!
//! Bootstrap kernel for plugins embedded in a host application.
//!
//! A [`BolgeCore`] reads a plugin directory
//!
//! ```text
//! plugin/
//! ├── .env                     optional
//! ├── config/
//! │   ├── settings.yaml
//! │   ├── routes.yaml
//! │   └── services.yaml
//! └── App/Entity/*.orm.yml     entity mappings, when a database is configured
//! ```
//!
//! assembles a service container from it, runs the request through the
//! router and the matched controller, and hands back the response, or
//! `None` when nothing in the plugin handles the request. On plugin
//! activation it brings the database schema up to date with the entity
//! mappings.
//!
//! ## Lifecycle events
//!
//! | Event | Name | When |
//! |-------|------|------|
//! | [`PreHandleEvent`] | `bolge.http_kernel.request` | before the kernel; may answer the request |
//! | [`BootEvent`] | `bolge.boot` | after every dispatch |
//! | [`ActivateEvent`] | `bolge.activate` | after schema synchronisation |
//!
//! Listeners are services tagged `event_subscriber`, or subscribers added
//! with [`BolgeCore::add_subscriber`].

pub mod bootstrap;
pub mod dispatcher;
pub mod error;
pub mod services;

pub use bootstrap::BolgeCore;
pub use dispatcher::RequestDispatcher;
pub use error::BootError;
pub use services::{ContainerAssembler, core_catalog};

pub use bolge_core::{
    ActivateEvent, BootEvent, Container, Controller, DispatchOutcome, HttpRequest, HttpResponse,
    PreHandleEvent, ResolvedArguments, RouteTable, ServiceCatalog,
};
pub use bolge_events::{Event, EventDispatcher, EventHandler, EventHandlerError, EventSubscriber, FnHandler};

pub use bolge_config;
pub use bolge_core;
pub use bolge_events;
pub use bolge_orm;
