//! HTTP layer module
//!
//! Request and response types shared by the router, the static file
//! streamer and API handlers.

pub mod method;
pub mod path;
pub mod request;
pub mod response;

// Re-export commonly used types
pub use method::{HttpMethod, UnknownMethod};
pub use path::extract_path;
pub use request::{empty_body, full_body, Request, RequestBody};
pub use response::{Response, ResponseBody};
