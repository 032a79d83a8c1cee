//! Request routing dispatch module
//!
//! Entry point for request processing. Decides between an API endpoint and
//! the static file streamer, rejects traversal attempts, and makes sure
//! every path ends the response exactly once.

use crate::api::{DispatchTable, Handler};
use crate::handler::static_files;
use crate::http::{extract_path, HttpMethod, Request, Response};
use crate::security::{is_traversal_attempt, AttackerReport, EventSink, HandlerFailure};
use futures::FutureExt;
use hyper::header::{HeaderValue, CONNECTION};
use hyper::StatusCode;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How a request was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A registered handler completed
    ApiHandled,
    /// A registered handler failed; the response is a 500
    ApiFailed,
    /// Traversal attempt; 422 and the connection must be closed
    Rejected,
    /// File piped into the response
    Streamed,
    /// No endpoint and no readable file; 404
    NotFound,
}

impl Outcome {
    /// Whether the connection has to be terminated after the response
    pub const fn closes_connection(self) -> bool {
        matches!(self, Self::Rejected)
    }
}

/// Routes requests from every listener
pub struct Router {
    working_directory: PathBuf,
    insecure_api: bool,
    endpoints: Arc<DispatchTable>,
    events: Arc<EventSink>,
}

impl Router {
    pub fn new(
        working_directory: impl Into<PathBuf>,
        insecure_api: bool,
        endpoints: Arc<DispatchTable>,
        events: Arc<EventSink>,
    ) -> Self {
        Self {
            working_directory: working_directory.into(),
            insecure_api,
            endpoints,
            events,
        }
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    pub const fn endpoints(&self) -> &Arc<DispatchTable> {
        &self.endpoints
    }

    pub const fn events(&self) -> &Arc<EventSink> {
        &self.events
    }

    /// Handle one request; the returned response is always ended
    pub async fn handle(&self, mut req: Request) -> (Response, Outcome) {
        let mut res = Response::new();
        let outcome = self.route(&mut req, &mut res).await;
        debug_assert!(res.is_ended());
        (res, outcome)
    }

    async fn route(&self, req: &mut Request, res: &mut Response) -> Outcome {
        let path = extract_path(req.target());

        // 1. API endpoints, only on TLS unless plaintext access is allowed
        if req.is_secure() || self.insecure_api {
            if let (Some(path), Some(method)) =
                (path.as_deref(), HttpMethod::from_hyper(req.method()))
            {
                if let Some(handler) = self.endpoints.lookup(method, path) {
                    return self.call_api(handler, method, path, req, res).await;
                }
            }
        }

        // 2. Traversal check before any filesystem access
        let Some(path) = path.filter(|p| !is_traversal_attempt(p)) else {
            self.reject(req, res);
            return Outcome::Rejected;
        };

        // 3. Static file
        let file_path = static_files::resolve(&self.working_directory, &path);
        if static_files::stream_file(&file_path, res).await {
            Outcome::Streamed
        } else {
            Outcome::NotFound
        }
    }

    async fn call_api(
        &self,
        handler: Arc<dyn Handler>,
        method: HttpMethod,
        path: &str,
        req: &mut Request,
        res: &mut Response,
    ) -> Outcome {
        let result = AssertUnwindSafe(handler.call(req, res)).catch_unwind().await;

        let error = match result {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(panic) => Some(panic_message(panic.as_ref()).into()),
        };

        let outcome = match error {
            None => {
                res.default_status(StatusCode::OK);
                Outcome::ApiHandled
            }
            Some(error) => {
                res.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                self.events.report_handler_failure(&HandlerFailure {
                    method,
                    path: path.to_string(),
                    error,
                });
                Outcome::ApiFailed
            }
        };

        // Safety net for handlers that left the response open
        res.end();
        outcome
    }

    fn reject(&self, req: &Request, res: &mut Response) {
        self.events
            .report_traversal(&AttackerReport::from_request(req));
        res.set_status(StatusCode::UNPROCESSABLE_ENTITY);
        res.insert_header(CONNECTION, HeaderValue::from_static("close"));
        res.end();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .map_or_else(
            || "handler panicked".to_string(),
            |msg| format!("handler panicked: {msg}"),
        )
}
