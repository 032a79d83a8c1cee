//! API endpoint module
//!
//! Application handlers registered per (method, path). Matching requests
//! bypass static file serving.

mod handler;
mod registry;

pub use handler::{handler_fn, FnHandler, Handler};
pub use registry::DispatchTable;
