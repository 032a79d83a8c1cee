//! Request wrapper handed to the router and to API handlers

use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::HeaderMap;
use hyper::{Method, Uri, Version};
use std::convert::Infallible;
use std::net::SocketAddr;

/// Body type of requests after they leave the connection layer
pub type RequestBody = BoxBody<Bytes, hyper::Error>;

/// Request as seen by the router
///
/// Carries the hyper request together with the connection facts the router
/// needs: the peer address and whether the connection is TLS.
pub struct Request {
    inner: hyper::Request<RequestBody>,
    remote_addr: SocketAddr,
    secure: bool,
}

impl Request {
    pub const fn new(
        inner: hyper::Request<RequestBody>,
        remote_addr: SocketAddr,
        secure: bool,
    ) -> Self {
        Self {
            inner,
            remote_addr,
            secure,
        }
    }

    /// Wrap a request read off a connection
    pub fn from_incoming(
        req: hyper::Request<Incoming>,
        remote_addr: SocketAddr,
        secure: bool,
    ) -> Self {
        Self::new(req.map(BodyExt::boxed), remote_addr, secure)
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    /// Raw request target: path plus query, exactly as received
    pub fn target(&self) -> &str {
        self.inner
            .uri()
            .path_and_query()
            .map_or_else(|| self.inner.uri().path(), |pq| pq.as_str())
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub const fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Whether the request arrived over the TLS listener
    pub const fn is_secure(&self) -> bool {
        self.secure
    }

    /// Header value as a string, if present and visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// Read the whole request body
    ///
    /// The body can be taken once; later calls yield an empty buffer.
    pub async fn body_bytes(&mut self) -> Result<Bytes, hyper::Error> {
        let body = std::mem::replace(self.inner.body_mut(), empty_body());
        Ok(body.collect().await?.to_bytes())
    }
}

/// Empty request body
pub fn empty_body() -> RequestBody {
    Empty::<Bytes>::new()
        .map_err(|never: Infallible| match never {})
        .boxed()
}

/// Request body from an in-memory buffer
pub fn full_body(data: impl Into<Bytes>) -> RequestBody {
    Full::new(data.into())
        .map_err(|never: Infallible| match never {})
        .boxed()
}
