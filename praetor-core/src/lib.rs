// Core library for the Praetor dispatch framework
// Routing, request contexts, dependency injection, middleware and multipart parsing

pub mod application;
pub mod container;
pub mod dispatcher;
pub mod error;
pub mod form;
pub mod http;
pub mod injector;
pub mod logging;
pub mod mapper;
pub mod middleware;
pub mod module;
pub mod multipart;
pub mod request;
pub mod routing;
pub mod upload;

// Re-export commonly used types
pub use application::*;
pub use container::*;
pub use dispatcher::*;
pub use error::*;
pub use form::*;
pub use self::http::*;
pub use injector::*;
pub use mapper::*;
pub use middleware::*;
pub use module::*;
pub use multipart::*;
pub use request::*;
pub use routing::{Route, Router}; // Path helpers stay under routing::
pub use upload::*;
