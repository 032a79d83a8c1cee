// Server module entry
// Listener binding, TLS setup, connection serving and lifecycle

pub mod connection;
pub mod listener;
pub mod manager;
pub mod signal;
pub mod tls;

// Re-export commonly used types
pub use connection::{accept_connection, serve_connection, ConnectionSettings};
pub use listener::{bind_all, create_reusable_listener};
pub use manager::{BoundAddr, WebServer};
pub use signal::shutdown_signal;
