//! Request handler module
//!
//! Responsible for request routing: API endpoint dispatch, traversal
//! rejection and static file streaming.

pub mod router;
pub mod static_files;

// Re-export main entry point
pub use router::{Outcome, Router};
