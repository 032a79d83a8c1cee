//! Security event sink
//!
//! Traversal attempts, handler failures and server shutdown are delivered
//! to registered observers. When a class has no observer the event is
//! written to the default log instead.

use super::traversal::AttackerReport;
use crate::error::HandlerError;
use crate::http::HttpMethod;
use crate::logger;
use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Observer list for one event class
pub struct Observers<T> {
    next_id: AtomicU64,
    list: RwLock<Vec<(ObserverId, Callback<T>)>>,
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            list: RwLock::new(Vec::new()),
        }
    }
}

impl<T> Observers<T> {
    pub fn subscribe<F>(&self, callback: F) -> ObserverId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.list
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));
        id
    }

    /// Remove an observer, returns whether it was registered
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut list = self.list.write().unwrap_or_else(PoisonError::into_inner);
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        list.len() != before
    }

    pub fn len(&self) -> usize {
        self.list.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every observer
    ///
    /// Returns `false` when nobody is listening. Callbacks run outside the
    /// lock so they may subscribe or unsubscribe.
    pub fn emit(&self, event: &T) -> bool {
        let snapshot: Vec<Callback<T>> = self
            .list
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in &snapshot {
            callback(event);
        }
        !snapshot.is_empty()
    }
}

/// A registered API handler returned an error or panicked
#[derive(Debug)]
pub struct HandlerFailure {
    pub method: HttpMethod,
    pub path: String,
    pub error: HandlerError,
}

/// The server stopped accepting connections
#[derive(Debug, Clone)]
pub struct ServerClosed {
    pub at: DateTime<Local>,
}

/// Observer registry for every event class the server emits
#[derive(Default)]
pub struct EventSink {
    traversal: Observers<AttackerReport>,
    handler_errors: Observers<HandlerFailure>,
    close: Observers<ServerClosed>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observers of detected traversal attempts
    pub const fn traversal(&self) -> &Observers<AttackerReport> {
        &self.traversal
    }

    /// Observers of handler failures
    pub const fn handler_errors(&self) -> &Observers<HandlerFailure> {
        &self.handler_errors
    }

    pub const fn close(&self) -> &Observers<ServerClosed> {
        &self.close
    }

    pub fn report_traversal(&self, report: &AttackerReport) {
        if !self.traversal.emit(report) {
            logger::log_warning(&format!(
                "Directory traversal attack attempted\nAttacker: {}",
                report.to_json()
            ));
        }
    }

    pub fn report_handler_failure(&self, failure: &HandlerFailure) {
        if !self.handler_errors.emit(failure) {
            logger::log_error(&format!(
                "API handler {} {} failed: {}",
                failure.method, failure.path, failure.error
            ));
        }
    }

    pub fn report_closed(&self) {
        let event = ServerClosed { at: Local::now() };
        if !self.close.emit(&event) {
            logger::log_info("Server closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_emit_without_observers_reports_false() {
        let observers: Observers<u32> = Observers::default();
        assert!(observers.is_empty());
        assert!(!observers.emit(&7));
    }

    #[test]
    fn test_every_observer_receives_event() {
        let observers: Observers<u32> = Observers::default();
        let total = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let total = Arc::clone(&total);
            observers.subscribe(move |value: &u32| {
                total.fetch_add(*value as usize, Ordering::SeqCst);
            });
        }
        assert!(observers.emit(&2));
        assert_eq!(total.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_unsubscribe() {
        let observers: Observers<u32> = Observers::default();
        let first = observers.subscribe(|_| {});
        let second = observers.subscribe(|_| {});
        assert_ne!(first, second);
        assert!(observers.unsubscribe(first));
        assert!(!observers.unsubscribe(first));
        assert_eq!(observers.len(), 1);
    }

    #[test]
    fn test_handler_failure_delivered_to_observer() {
        let sink = EventSink::new();
        let seen = Arc::new(RwLock::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        sink.handler_errors().subscribe(move |failure: &HandlerFailure| {
            seen_clone
                .write()
                .unwrap()
                .push(format!("{} {} {}", failure.method, failure.path, failure.error));
        });

        sink.report_handler_failure(&HandlerFailure {
            method: HttpMethod::Post,
            path: "/orders".to_string(),
            error: "database unavailable".into(),
        });

        assert_eq!(
            *seen.read().unwrap(),
            vec!["POST /orders database unavailable".to_string()]
        );
    }

    #[test]
    fn test_close_event_delivered() {
        let sink = EventSink::new();
        let closed = Arc::new(AtomicUsize::new(0));
        let closed_clone = Arc::clone(&closed);
        sink.close().subscribe(move |_| {
            closed_clone.fetch_add(1, Ordering::SeqCst);
        });
        sink.report_closed();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }
}
