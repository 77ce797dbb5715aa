// Core library for the Bolge bootstrap kernel
// HTTP value types, the route table, the service container and the request kernel

pub mod container;
pub mod controller;
pub mod error;
pub mod http;
pub mod kernel;
pub mod lifecycle;
pub mod logging;
pub mod routing;

pub use container::*;
pub use controller::*;
pub use error::*;
pub use http::*;
pub use kernel::*;
pub use lifecycle::*;
pub use routing::*;
