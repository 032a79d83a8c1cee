// Connection handling module
// Serves a single TCP or TLS connection with the shared router

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio_rustls::TlsAcceptor;

use crate::config::Config;
use crate::handler::Router;
use crate::http::Request;
use crate::logger::{self, AccessLogEntry};

/// Per-connection settings shared by every listener
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub keep_alive: bool,
    /// Upper bound on a connection's lifetime, TLS handshake included
    pub timeout: Option<Duration>,
    /// Access log format, `None` when access logging is off
    pub access_log_format: Option<String>,
}

impl ConnectionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            keep_alive: config.performance.keep_alive,
            timeout: config.connection_timeout(),
            access_log_format: config
                .logging
                .access_log
                .then(|| config.logging.access_log_format.clone()),
        }
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            keep_alive: true,
            timeout: None,
            access_log_format: None,
        }
    }
}

/// Accept a connection and serve it in a spawned task.
///
/// With an acceptor the TLS handshake runs first and the requests are
/// routed as secure.
pub fn accept_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    tls: Option<TlsAcceptor>,
    router: Arc<Router>,
    settings: Arc<ConnectionSettings>,
) {
    if settings.access_log_format.is_some() {
        logger::log_connection_accepted(&peer_addr, tls.is_some());
    }

    tokio::spawn(async move {
        let serve = async {
            match tls {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        serve_connection(tls_stream, peer_addr, true, router, &settings).await;
                    }
                    Err(e) => {
                        logger::log_warning(&format!("TLS handshake with {peer_addr} failed: {e}"));
                    }
                },
                None => serve_connection(stream, peer_addr, false, router, &settings).await,
            }
        };

        match settings.timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, serve).await.is_err() {
                    logger::log_warning(&format!(
                        "Connection from {peer_addr} timed out after {} seconds",
                        limit.as_secs()
                    ));
                }
            }
            None => serve.await,
        }
    });
}

/// Serve HTTP/1.1 or HTTP/2 on an established stream until the peer or the
/// router closes it
///
/// On TLS the protocol is picked from the connection preface, so clients
/// that negotiated `h2` over ALPN are served HTTP/2. Plaintext connections
/// speak HTTP/1 only. A rejected request triggers a
/// graceful shutdown: the 422 response is written, then the connection is
/// closed (HTTP/1.1) or sent a GOAWAY (HTTP/2).
pub async fn serve_connection<IO>(
    io: IO,
    peer_addr: SocketAddr,
    secure: bool,
    router: Arc<Router>,
    settings: &ConnectionSettings,
) where
    IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let closer = Arc::new(Notify::new());
    let access_log_format = settings.access_log_format.clone();

    let service = {
        let closer = Arc::clone(&closer);
        service_fn(move |req| {
            let router = Arc::clone(&router);
            let closer = Arc::clone(&closer);
            let access_log_format = access_log_format.clone();
            async move {
                let started = Instant::now();
                let entry = access_log_format
                    .as_ref()
                    .map(|_| access_entry(&req, peer_addr, secure));

                let request = Request::from_incoming(req, peer_addr, secure);
                let (response, outcome) = router.handle(request).await;
                if outcome.closes_connection() {
                    closer.notify_one();
                }

                if let (Some(mut entry), Some(format)) = (entry, access_log_format.as_deref()) {
                    entry.status = response.status().as_u16();
                    entry.body_bytes = response.body_len();
                    entry.request_time_us =
                        u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
                    logger::log_access(&entry, format);
                }

                Ok::<_, Infallible>(response.into_hyper())
            }
        })
    };

    let mut builder = auto::Builder::new(TokioExecutor::new());
    if !secure {
        builder = builder.http1_only();
    }
    builder.http1().keep_alive(settings.keep_alive);
    let conn = builder.serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    let mut closing = false;
    let result = loop {
        tokio::select! {
            result = conn.as_mut() => break result,
            () = closer.notified(), if !closing => {
                conn.as_mut().graceful_shutdown();
                closing = true;
            }
        }
    };

    if let Err(err) = result {
        // Peers hanging up mid-response are routine
        let incomplete = err
            .downcast_ref::<hyper::Error>()
            .is_some_and(hyper::Error::is_incomplete_message);
        if !incomplete {
            logger::log_connection_error(&err);
        }
    }
}

fn access_entry<B>(req: &hyper::Request<B>, peer_addr: SocketAddr, secure: bool) -> AccessLogEntry {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string)
    };

    let target = req
        .uri()
        .path_and_query()
        .map_or_else(|| req.uri().path().to_string(), ToString::to_string);
    let mut entry = AccessLogEntry::new(peer_addr, req.method().to_string(), target, secure);
    entry.http_version = match req.version() {
        hyper::Version::HTTP_09 => "0.9",
        hyper::Version::HTTP_10 => "1.0",
        hyper::Version::HTTP_2 => "2",
        hyper::Version::HTTP_3 => "3",
        _ => "1.1",
    }
    .to_string();
    entry.referer = header("referer");
    entry.user_agent = header("user-agent");
    entry
}
