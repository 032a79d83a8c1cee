//! Static file web server with a TLS listener, a plaintext listener and
//! registrable API endpoints.
//!
//! Requests are dispatched to a registered [`api::Handler`] when one
//! matches the method and path, otherwise the path is screened for
//! directory traversal and served from the working directory.

pub mod api;
pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod logger;
pub mod security;
pub mod server;

pub use api::{handler_fn, DispatchTable, Handler};
pub use config::Config;
pub use error::{HandlerError, ServerError, ServerResult};
pub use http::{HttpMethod, Request, Response};
pub use security::{AttackerReport, EventSink};
pub use server::{shutdown_signal, WebServer};
