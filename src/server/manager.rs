// Server manager module
// Owns the listeners, the shared router and the accept loops

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::api::{DispatchTable, Handler};
use crate::config::Config;
use crate::error::{ServerError, ServerResult};
use crate::handler::Router;
use crate::http::HttpMethod;
use crate::logger;
use crate::security::EventSink;
use crate::server::connection::{accept_connection, ConnectionSettings};
use crate::server::{listener, tls};

/// A bound address and whether it serves TLS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddr {
    pub addr: SocketAddr,
    pub secure: bool,
}

/// Running web server with its secure and plaintext listeners
pub struct WebServer {
    router: Arc<Router>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
    bound: Vec<BoundAddr>,
    closed: bool,
}

impl WebServer {
    /// Bind every configured listener and start accepting connections
    ///
    /// Creates the working directory if it does not exist yet. Fails
    /// without serving anything when any listener cannot be bound.
    pub async fn bind(config: &Config) -> ServerResult<Self> {
        config.validate()?;

        let working_directory = config.working_directory();
        tokio::fs::create_dir_all(&working_directory).await?;

        let router = Arc::new(Router::new(
            working_directory,
            config.server.insecure_api,
            Arc::new(DispatchTable::new()),
            Arc::new(EventSink::new()),
        ));
        let settings = Arc::new(ConnectionSettings::from_config(config));

        let mut pending: Vec<(TcpListener, Option<TlsAcceptor>)> = Vec::new();
        if config.server.secure_run {
            let acceptor = secure_acceptor(config)?;
            for listener in listener::bind_all(&config.secure_addrs()?)? {
                pending.push((listener, Some(acceptor.clone())));
            }
        }
        if config.server.insecure_run {
            for listener in listener::bind_all(&config.insecure_addrs()?)? {
                pending.push((listener, None));
            }
        }

        let (shutdown, _) = watch::channel(false);
        let mut tasks = Vec::with_capacity(pending.len());
        let mut bound = Vec::with_capacity(pending.len());
        for (listener, acceptor) in pending {
            let addr = listener.local_addr()?;
            let secure = acceptor.is_some();
            logger::log_listener_bound(&addr, secure);
            bound.push(BoundAddr { addr, secure });
            tasks.push(tokio::spawn(accept_loop(
                listener,
                acceptor,
                Arc::clone(&router),
                Arc::clone(&settings),
                shutdown.subscribe(),
            )));
        }

        Ok(Self {
            router,
            shutdown,
            tasks,
            bound,
            closed: false,
        })
    }

    /// Registered API endpoints
    pub fn endpoints(&self) -> &Arc<DispatchTable> {
        self.router.endpoints()
    }

    /// Event observers
    pub fn events(&self) -> &Arc<EventSink> {
        self.router.events()
    }

    pub fn working_directory(&self) -> &Path {
        self.router.working_directory()
    }

    /// Register an API endpoint, replacing any handler on the same method and path
    pub fn register<H: Handler>(&self, method: HttpMethod, path: &str, handler: H) -> bool {
        self.endpoints().register(method, path, handler)
    }

    pub fn unregister(&self, method: HttpMethod, path: &str) -> bool {
        self.endpoints().unregister(method, path)
    }

    /// Every bound address in bind order, secure listeners first
    pub fn local_addrs(&self) -> &[BoundAddr] {
        &self.bound
    }

    pub fn secure_addrs(&self) -> Vec<SocketAddr> {
        self.bound.iter().filter(|b| b.secure).map(|b| b.addr).collect()
    }

    pub fn insecure_addrs(&self) -> Vec<SocketAddr> {
        self.bound.iter().filter(|b| !b.secure).map(|b| b.addr).collect()
    }

    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop accepting connections and emit the close event
    ///
    /// Connections already accepted finish on their own. Calling this more
    /// than once has no further effect.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        // Receivers live in the accept loops; nobody listening is fine
        let _ = self.shutdown.send(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                logger::log_error(&format!("Accept loop ended abnormally: {e}"));
            }
        }
        self.router.events().report_closed();
    }
}

fn secure_acceptor(config: &Config) -> ServerResult<TlsAcceptor> {
    match (&config.tls.cert_file, &config.tls.key_file) {
        (Some(cert), Some(key)) => tls::load_acceptor(Path::new(cert), Path::new(key)),
        _ => Err(ServerError::Config(
            "secure_run requires tls.cert_file and tls.key_file".to_string(),
        )),
    }
}

async fn accept_loop(
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    router: Arc<Router>,
    settings: Arc<ConnectionSettings>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(
                            stream,
                            peer_addr,
                            tls.clone(),
                            Arc::clone(&router),
                            Arc::clone(&settings),
                        );
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            _ = shutdown.changed() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handler_fn;
    use crate::security::ServerClosed;
    use http_body_util::{BodyExt, Empty};
    use hyper::body::Bytes;
    use hyper::StatusCode;
    use hyper_util::rt::{TokioExecutor, TokioIo};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio_rustls::client::TlsStream;
    use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
    use tokio_rustls::rustls::{ClientConfig, RootCertStore};
    use tokio_rustls::TlsConnector;

    fn plaintext_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.working_directory = dir.join("site").display().to_string();
        config.server.secure_run = false;
        config.server.insecure_ports = vec![0];
        config.logging.access_log = false;
        config
    }

    async fn exchange(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await.unwrap();
        String::from_utf8_lossy(&raw).into_owned()
    }

    #[tokio::test]
    async fn test_serves_files_and_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let config = plaintext_config(dir.path());
        let mut server = WebServer::bind(&config).await.unwrap();
        std::fs::write(server.working_directory().join("index.html"), "<h1>hi</h1>").unwrap();

        let traversals = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&traversals);
        server.events().traversal().subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let addr = server.insecure_addrs()[0];
        let page = exchange(
            addr,
            "GET /index.html HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(page.starts_with("HTTP/1.1 200 OK"));
        assert!(page.contains("<h1>hi</h1>"));

        // No Connection: close from the client; the server hangs up anyway
        let rejected = exchange(addr, "GET /a%5cb HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert!(rejected.starts_with("HTTP/1.1 422"));
        assert_eq!(traversals.load(Ordering::SeqCst), 1);

        server.close().await;
    }

    #[tokio::test]
    async fn test_plaintext_api_when_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = plaintext_config(dir.path());
        config.server.insecure_api = true;
        let mut server = WebServer::bind(&config).await.unwrap();
        server.register(
            HttpMethod::Get,
            "/status",
            handler_fn(|_req, res| {
                res.send(b"ok")?;
                Ok(())
            }),
        );

        let addr = server.insecure_addrs()[0];
        let reply = exchange(
            addr,
            "GET /status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(reply.starts_with("HTTP/1.1 200 OK"));
        assert!(reply.ends_with("\r\n\r\nok"));

        assert!(server.unregister(HttpMethod::Get, "/status"));
        let missing = exchange(
            addr,
            "GET /status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await;
        assert!(missing.starts_with("HTTP/1.1 404"));

        server.close().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_stops_accepting() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = WebServer::bind(&plaintext_config(dir.path())).await.unwrap();
        let addr = server.insecure_addrs()[0];

        let closes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closes);
        server.events().close().subscribe(move |_: &ServerClosed| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        server.close().await;
        server.close().await;
        assert!(server.is_closed());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_secure_run_without_certificates_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = plaintext_config(dir.path());
        config.server.secure_run = true;
        config.server.secure_ports = vec![0];
        assert!(WebServer::bind(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_port_in_use_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        let taken = listener::create_reusable_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let mut config = plaintext_config(dir.path());
        config.server.insecure_ports = vec![taken.local_addr().unwrap().port()];

        match WebServer::bind(&config).await {
            Err(ServerError::Bind { addr, .. }) => assert_eq!(addr, taken.local_addr().unwrap()),
            Err(other) => panic!("expected bind error, got {other}"),
            Ok(_) => panic!("bound a port that is already in use"),
        }
    }

    /// TLS-only config with a fresh self-signed certificate for `localhost`
    fn secure_config(dir: &Path) -> (Config, CertificateDer<'static>) {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = dir.join("cert.pem");
        let key_path = dir.join("key.pem");
        std::fs::write(&cert_path, certified.cert.pem()).unwrap();
        std::fs::write(&key_path, certified.key_pair.serialize_pem()).unwrap();

        let mut config = plaintext_config(dir);
        config.server.secure_run = true;
        config.server.insecure_run = false;
        config.server.secure_ports = vec![0];
        config.tls.cert_file = Some(cert_path.display().to_string());
        config.tls.key_file = Some(key_path.display().to_string());
        (config, certified.cert.der().clone())
    }

    async fn tls_connect(
        addr: SocketAddr,
        root: &CertificateDer<'static>,
        alpn: &[&[u8]],
    ) -> TlsStream<TcpStream> {
        let mut roots = RootCertStore::empty();
        roots.add(root.clone()).unwrap();
        let mut client = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        client.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();

        let tcp = TcpStream::connect(addr).await.unwrap();
        TlsConnector::from(Arc::new(client))
            .connect(ServerName::try_from("localhost").unwrap(), tcp)
            .await
            .unwrap()
    }

    async fn read_until_closed<S: AsyncRead + Unpin>(stream: &mut S) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => raw.extend_from_slice(&buf[..n]),
                // Closed without close_notify
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => panic!("read failed: {e}"),
            }
        }
        String::from_utf8_lossy(&raw).into_owned()
    }

    fn counting_status(server: &WebServer) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        server.register(
            HttpMethod::Get,
            "/status",
            handler_fn(move |_req, res| {
                counter.fetch_add(1, Ordering::SeqCst);
                res.send(b"ok")?;
                Ok(())
            }),
        );
        calls
    }

    #[tokio::test]
    async fn test_secure_listener_over_http1() {
        let dir = tempfile::tempdir().unwrap();
        let (config, root) = secure_config(dir.path());
        let mut server = WebServer::bind(&config).await.unwrap();
        let calls = counting_status(&server);
        let addr = server.secure_addrs()[0];
        assert!(server.insecure_addrs().is_empty());

        let mut tls = tls_connect(addr, &root, &[b"http/1.1"]).await;
        assert_eq!(tls.get_ref().1.alpn_protocol(), Some(&b"http/1.1"[..]));
        tls.write_all(b"GET /status HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let reply = read_until_closed(&mut tls).await;
        assert!(reply.starts_with("HTTP/1.1 200 OK"));
        assert!(reply.ends_with("\r\n\r\nok"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Keep-alive requested; the server still ends the connection
        let mut tls = tls_connect(addr, &root, &[b"http/1.1"]).await;
        tls.write_all(b"GET /a%5cb HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let rejected = tokio::time::timeout(Duration::from_secs(5), read_until_closed(&mut tls))
            .await
            .unwrap();
        assert!(rejected.starts_with("HTTP/1.1 422"));

        server.close().await;
    }

    #[tokio::test]
    async fn test_secure_listener_over_http2() {
        let dir = tempfile::tempdir().unwrap();
        let (config, root) = secure_config(dir.path());
        let mut server = WebServer::bind(&config).await.unwrap();
        let calls = counting_status(&server);
        let addr = server.secure_addrs()[0];

        let tls = tls_connect(addr, &root, &[b"h2"]).await;
        assert_eq!(tls.get_ref().1.alpn_protocol(), Some(&b"h2"[..]));
        let (mut sender, conn) =
            hyper::client::conn::http2::handshake(TokioExecutor::new(), TokioIo::new(tls))
                .await
                .unwrap();
        let driver = tokio::spawn(conn);

        let request = |path: &str| {
            hyper::Request::builder()
                .uri(format!("https://localhost{path}"))
                .body(Empty::<Bytes>::new())
                .unwrap()
        };

        let res = sender.send_request(request("/status")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.version(), hyper::Version::HTTP_2);
        let body = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let res = sender.send_request(request("/a%5cb")).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

        // GOAWAY from the server ends the client connection
        assert!(tokio::time::timeout(Duration::from_secs(5), driver).await.is_ok());

        server.close().await;
    }
}
