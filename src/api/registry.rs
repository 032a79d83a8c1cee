//! Endpoint dispatch table
//!
//! Two-level registry: method → lowercased path → handler. A method's map
//! exists only while it holds at least one endpoint.

use super::handler::Handler;
use crate::http::HttpMethod;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

type Endpoints = HashMap<String, Arc<dyn Handler>>;

/// Registry of API endpoints shared by every connection
///
/// Lookups clone the handler out and release the lock before the handler
/// runs, so registration never waits on a request in flight.
#[derive(Default)]
pub struct DispatchTable {
    methods: RwLock<HashMap<HttpMethod, Endpoints>>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler to `(method, path)`, replacing any previous one
    ///
    /// Returns `true` when an existing handler was replaced.
    pub fn register<H: Handler>(&self, method: HttpMethod, path: &str, handler: H) -> bool {
        self.register_shared(method, path, Arc::new(handler))
    }

    /// Same as [`register`](Self::register) for an already shared handler
    pub fn register_shared(&self, method: HttpMethod, path: &str, handler: Arc<dyn Handler>) -> bool {
        let mut methods = self.methods.write().unwrap_or_else(PoisonError::into_inner);
        methods
            .entry(method)
            .or_default()
            .insert(path.to_lowercase(), handler)
            .is_some()
    }

    /// Remove the endpoint for `(method, path)`
    ///
    /// The method's map is dropped once its last endpoint is gone. Returns
    /// whether an endpoint was removed.
    pub fn unregister(&self, method: HttpMethod, path: &str) -> bool {
        let mut methods = self.methods.write().unwrap_or_else(PoisonError::into_inner);
        let Some(endpoints) = methods.get_mut(&method) else {
            return false;
        };
        let removed = endpoints.remove(&path.to_lowercase()).is_some();
        if endpoints.is_empty() {
            methods.remove(&method);
        }
        removed
    }

    pub fn lookup(&self, method: HttpMethod, path: &str) -> Option<Arc<dyn Handler>> {
        let methods = self.methods.read().unwrap_or_else(PoisonError::into_inner);
        methods
            .get(&method)
            .and_then(|endpoints| endpoints.get(&path.to_lowercase()))
            .map(Arc::clone)
    }

    pub fn contains(&self, method: HttpMethod, path: &str) -> bool {
        self.lookup(method, path).is_some()
    }

    /// Number of registered endpoints across all methods
    pub fn len(&self) -> usize {
        self.methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(HashMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Methods that currently have at least one endpoint
    pub fn methods(&self) -> Vec<HttpMethod> {
        let mut methods: Vec<HttpMethod> = self
            .methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        methods.sort();
        methods
    }
}
