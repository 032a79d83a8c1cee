//! Security module
//!
//! Directory traversal detection and the event sink that reports
//! traversal attempts and handler failures.

pub mod events;
pub mod traversal;

pub use events::{EventSink, HandlerFailure, ObserverId, Observers, ServerClosed};
pub use traversal::{is_traversal_attempt, AttackerReport};
