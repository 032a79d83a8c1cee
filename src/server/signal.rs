// Signal handling module
//
// Supported signals:
// - SIGTERM: Graceful shutdown
// - SIGINT:  Graceful shutdown (Ctrl+C)

use crate::logger;

/// Resolve once the process is asked to stop
///
/// Registration failures are logged and that signal is ignored; Ctrl+C
/// stays available on every platform.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => Some(s),
        Err(e) => {
            logger::log_warning(&format!("Failed to register SIGTERM handler: {e}"));
            None
        }
    };

    let terminate = async {
        match sigterm.as_mut() {
            Some(s) => {
                s.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => logger::log_info("SIGINT received, initiating shutdown"),
            Err(e) => logger::log_error(&format!("Failed to listen for Ctrl+C: {e}")),
        },
        () = terminate => logger::log_info("SIGTERM received, initiating shutdown"),
    }
}

/// Non-unix fallback, only handles Ctrl+C
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => logger::log_info("Ctrl+C received, initiating shutdown"),
        Err(e) => logger::log_error(&format!("Failed to listen for Ctrl+C: {e}")),
    }
}
