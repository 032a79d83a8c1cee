//! Writable response
//!
//! Handlers receive a `&mut Response` and write to it the way they would to
//! a socket: status and headers first, then body chunks, then `end()`.
//! Once any body byte is written or the response is ended, status and
//! headers are committed and later changes are ignored. Ending is
//! idempotent, so every code path in the router can finalize safely.

use crate::error::ResponseError;
use crate::logger;
use futures::TryStreamExt;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Bytes, Frame};
use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::StatusCode;
use std::convert::Infallible;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

/// Body type of responses handed to hyper
pub type ResponseBody = BoxBody<Bytes, std::io::Error>;

enum Payload {
    Buffered(Vec<u8>),
    File(File),
}

pub struct Response {
    status: Option<StatusCode>,
    headers: HeaderMap,
    payload: Payload,
    ended: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            status: None,
            headers: HeaderMap::new(),
            payload: Payload::Buffered(Vec::new()),
            ended: false,
        }
    }

    /// Current status, 200 when nothing was set
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Whether the handler (or router) explicitly chose a status
    pub const fn has_explicit_status(&self) -> bool {
        self.status.is_some()
    }

    /// Whether status and headers can no longer change
    pub fn headers_sent(&self) -> bool {
        self.ended
            || match &self.payload {
                Payload::Buffered(buf) => !buf.is_empty(),
                Payload::File(_) => true,
            }
    }

    /// Set the status code; ignored once headers are sent
    pub fn set_status(&mut self, status: StatusCode) {
        if !self.headers_sent() {
            self.status = Some(status);
        }
    }

    /// Set the status only if none was chosen and headers are not sent
    pub fn default_status(&mut self, status: StatusCode) {
        if self.status.is_none() && !self.headers_sent() {
            self.status = Some(status);
        }
    }

    /// Insert a header; ignored once headers are sent
    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        if !self.headers_sent() {
            self.headers.insert(name, value);
        }
    }

    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Append a chunk to the body
    pub fn write(&mut self, chunk: impl AsRef<[u8]>) -> Result<(), ResponseError> {
        if self.ended {
            return Err(ResponseError::WriteAfterEnd);
        }
        match &mut self.payload {
            Payload::Buffered(buf) => {
                buf.extend_from_slice(chunk.as_ref());
                Ok(())
            }
            Payload::File(_) => Err(ResponseError::WriteAfterEnd),
        }
    }

    /// Write a final chunk and end the response
    pub fn send(&mut self, chunk: impl AsRef<[u8]>) -> Result<(), ResponseError> {
        self.write(chunk)?;
        self.end();
        Ok(())
    }

    /// Finalize the response
    ///
    /// Returns `true` only for the call that actually ended it.
    pub fn end(&mut self) -> bool {
        if self.ended {
            return false;
        }
        self.ended = true;
        true
    }

    pub const fn is_ended(&self) -> bool {
        self.ended
    }

    /// Body bytes written so far, `None` for a streamed file
    pub fn body_len(&self) -> Option<usize> {
        match &self.payload {
            Payload::Buffered(buf) => Some(buf.len()),
            Payload::File(_) => None,
        }
    }

    /// Pipe a file as the body; the stream ends the response
    pub(crate) fn pipe_file(&mut self, file: File) {
        if self.ended {
            return;
        }
        self.default_status(StatusCode::OK);
        self.payload = Payload::File(file);
        self.end();
    }

    /// Convert into the hyper response written to the connection
    pub fn into_hyper(self) -> hyper::Response<ResponseBody> {
        let status = self.status();
        let body = match self.payload {
            Payload::Buffered(buf) => Full::new(Bytes::from(buf))
                .map_err(|never: Infallible| match never {})
                .boxed(),
            Payload::File(file) => {
                let stream = ReaderStream::new(file)
                    .map_ok(Frame::data)
                    .inspect_err(|e| {
                        logger::log_warning(&format!("File stream aborted: {e}"));
                    });
                StreamBody::new(stream).boxed()
            }
        };

        let mut response = hyper::Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = self.headers;
        response
    }
}
