//! Logger module
//!
//! Provides logging utilities for the web server including:
//! - Server lifecycle logging
//! - Access logging with multiple formats
//! - Error and warning logging
//! - File-based logging support

mod format;
pub mod writer;

pub use format::AccessLogEntry;

use crate::config::{Config, LoggingConfig};
use std::net::SocketAddr;

/// Initialize the logger with configuration
///
/// Should be called once at application startup.
pub fn init(config: &LoggingConfig) -> std::io::Result<()> {
    writer::init(
        config.access_log_file.as_deref(),
        config.error_log_file.as_deref(),
    )
}

/// Write to info/access log
fn write_info(message: &str) {
    match writer::get() {
        Some(w) => w.write_access(message),
        None => println!("{message}"),
    }
}

/// Write to error log
fn write_error(message: &str) {
    match writer::get() {
        Some(w) => w.write_error(message),
        None => eprintln!("{message}"),
    }
}

pub fn log_server_start(config: &Config) {
    write_info("======================================");
    write_info("Web server starting");
    write_info(&format!(
        "Working directory: {}",
        config.working_directory().display()
    ));
    write_info(&format!(
        "Secure listener: {} {:?}",
        if config.server.secure_run { "on" } else { "off" },
        config.server.secure_ports
    ));
    write_info(&format!(
        "Plaintext listener: {} {:?}",
        if config.server.insecure_run { "on" } else { "off" },
        config.server.insecure_ports
    ));
    write_info(&format!(
        "API on plaintext connections: {}",
        config.server.insecure_api
    ));
    if let Some(workers) = config.server.workers {
        write_info(&format!("Worker threads: {workers}"));
    }
    if let Some(ref path) = config.logging.access_log_file {
        write_info(&format!("Access log: {path}"));
    }
    if let Some(ref path) = config.logging.error_log_file {
        write_info(&format!("Error log: {path}"));
    }
    write_info("======================================");
}

pub fn log_listener_bound(addr: &SocketAddr, secure: bool) {
    let scheme = if secure { "https" } else { "http" };
    write_info(&format!("Listening on: {scheme}://{addr}"));
}

pub fn log_connection_accepted(peer_addr: &SocketAddr, secure: bool) {
    let kind = if secure { "TLS" } else { "TCP" };
    write_info(&format!("[Connection] {kind} accepted from: {peer_addr}"));
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    write_error(&format!("[ERROR] Failed to serve connection: {err:?}"));
}

pub fn log_info(message: &str) {
    write_info(&format!("[INFO] {message}"));
}

pub fn log_error(message: &str) {
    write_error(&format!("[ERROR] {message}"));
}

pub fn log_warning(message: &str) {
    write_error(&format!("[WARN] {message}"));
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    write_info(&entry.format(format));
}
