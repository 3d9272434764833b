//! The Listener: owns one TCP endpoint, its routing mux, the injection
//! queue feeding the HTTP/1 server, and the insecure-mode flag. Dispatches
//! each accepted connection through PROXY decoding, tagging, and protocol
//! selection (components C, B, D of the design).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http_body_util::BodyExt;
use hyper::server::conn::{http1, http2};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use socket2::{Domain, Socket, Type};
use tokio::net::{TcpListener, TcpStream};

use super::conn::{ConnInfo, Proto, TaggedConn};
use super::inject::InjectionQueue;
use super::mux::Mux;
use super::proxy_protocol;
use crate::body::Request;
use crate::error::FatalError;
use crate::middleware::Handler;

pub struct Listener {
    pub network: String,
    pub address: String,
    insecure: AtomicBool,
    mux: Mux,
    queue: Arc<InjectionQueue>,
}

impl Listener {
    pub fn new(network: impl Into<String>, address: impl Into<String>) -> Arc<Self> {
        Arc::new(Listener {
            network: network.into(),
            address: address.into(),
            insecure: AtomicBool::new(false),
            mux: Mux::new(),
            queue: Arc::new(InjectionQueue::new()),
        })
    }

    pub fn set_insecure(&self) {
        self.insecure.store(true, Ordering::Relaxed);
    }

    pub fn is_insecure(&self) -> bool {
        self.insecure.load(Ordering::Relaxed)
    }

    pub fn register(&self, host: &str, path: &str, handler: Arc<dyn Handler>) {
        self.mux.register(host, path, handler);
    }

    pub fn route_count(&self) -> usize {
        self.mux.len()
    }

    /// Binds the socket, logs it, and spawns the accept loop and the HTTP/1
    /// server loop as long-lived background tasks. Returns once the socket
    /// is bound; the listener then runs until process exit.
    pub async fn start(self: &Arc<Self>) -> Result<(), FatalError> {
        let tcp = bind_reuseaddr(&self.address).map_err(|source| FatalError::Bind {
            network: self.network.clone(),
            address: self.address.clone(),
            source,
        })?;
        tracing::info!(address = %self.address, "HTTP server listening");

        let accept_lis = self.clone();
        tokio::spawn(async move { accept_lis.accept_loop(tcp).await });

        let http1_lis = self.clone();
        tokio::spawn(async move { http1_lis.http1_loop().await });

        Ok(())
    }

    async fn accept_loop(self: Arc<Self>, tcp: TcpListener) {
        loop {
            let (stream, peer) = match tcp.accept().await {
                Ok(pair) => pair,
                Err(source) => {
                    tracing::error!(address = %self.address, error = %source, "accept failed");
                    std::process::exit(1);
                }
            };
            let lis = self.clone();
            tokio::spawn(async move { lis.handle_connection(stream, peer).await });
        }
    }

    async fn handle_connection(self: Arc<Self>, mut stream: TcpStream, peer: SocketAddr) {
        let decoded = match proxy_protocol::decode(&mut stream).await {
            Ok(d) => d,
            Err(err) => {
                tracing::warn!(address = %self.address, error = %err, "malformed PROXY header, dropping connection");
                return;
            }
        };

        let remote_addr = decoded.source_addr.unwrap_or(peer);
        let proto = decoded
            .alpn
            .as_deref()
            .map(Proto::from_alpn)
            .unwrap_or(Proto::Unspecified);

        if !proto.is_supported() {
            tracing::warn!(address = %self.address, proto = ?proto, "unsupported protocol, dropping connection");
            return;
        }

        let info = ConnInfo {
            proto: proto.clone(),
            tls_state: decoded.tls_state,
            remote_addr,
        };
        let tagged = TaggedConn::new(stream, info.clone());

        if proto.is_http2() {
            self.serve_http2(tagged, info).await;
        } else if let Err(_closed) = self.queue.enqueue(tagged).await {
            tracing::warn!(address = %self.address, "injection queue closed, dropping connection");
        }
    }

    async fn http1_loop(self: Arc<Self>) {
        while let Some(conn) = self.queue.dequeue().await {
            let lis = self.clone();
            tokio::spawn(async move { lis.serve_http1(conn).await });
        }
    }

    async fn serve_http1(self: Arc<Self>, conn: TaggedConn) {
        let info = conn.info();
        let lis = self.clone();
        let service = service_fn(move |req: http::Request<hyper::body::Incoming>| {
            let lis = lis.clone();
            let info = info.clone();
            async move { Ok::<_, std::convert::Infallible>(lis.entry(info, req).await) }
        });
        if let Err(err) = http1::Builder::new()
            .serve_connection(TokioIo::new(conn), service)
            .await
        {
            tracing::warn!(address = %self.address, error = %err, "HTTP/1 connection error");
        }
    }

    async fn serve_http2(self: Arc<Self>, conn: TaggedConn, info: ConnInfo) {
        let lis = self.clone();
        let service = service_fn(move |req: http::Request<hyper::body::Incoming>| {
            let lis = lis.clone();
            let info = info.clone();
            async move { Ok::<_, std::convert::Infallible>(lis.entry(info, req).await) }
        });
        if let Err(err) = http2::Builder::new(TokioExecutor::new())
            .serve_connection(TokioIo::new(conn), service)
            .await
        {
            tracing::warn!(address = %self.address, error = %err, "HTTP/2 connection error");
        }
    }

    /// The single entry point for both HTTP servers: republishes the
    /// connection's TLS state onto the request, redirects to HTTPS when the
    /// listener isn't insecure and no TLS state is present, then routes
    /// through the mux.
    async fn entry(
        self: Arc<Self>,
        info: ConnInfo,
        req: http::Request<hyper::body::Incoming>,
    ) -> crate::body::Response {
        let mut req: Request = req.map(|b| b.map_err(|e| Box::new(e) as crate::body::BoxError).boxed());
        req.extensions_mut().insert(info.clone());

        if info.tls_state.is_none() && !self.is_insecure() {
            return redirect_to_https(&req);
        }

        let host = request_host(&req);
        let path = req.uri().path().to_string();
        match self.mux.route(&host, &path) {
            Some(handler) => handler.serve(req).await,
            None => crate::body::not_found(),
        }
    }
}

/// Binds a TCP listener with `SO_REUSEADDR` set, so a restarted process can
/// rebind a just-vacated port without waiting out `TIME_WAIT`.
fn bind_reuseaddr(address: &str) -> std::io::Result<TcpListener> {
    let addr: SocketAddr = address
        .parse()
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid address"))?;
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::STREAM, Some(socket2::Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    TcpListener::from_std(socket.into())
}

fn request_host(req: &Request) -> String {
    let raw = req
        .uri()
        .host()
        .map(|h| h.to_string())
        .or_else(|| {
            req.headers()
                .get(http::header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
        .unwrap_or_default();
    raw.split(':').next().unwrap_or("").to_string()
}

fn redirect_to_https(req: &Request) -> crate::body::Response {
    let host = req
        .headers()
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let uri = req.uri();
    let location = format!(
        "https://{host}{}",
        uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
    );
    http::Response::builder()
        .status(http::StatusCode::MOVED_PERMANENTLY)
        .header(
            http::header::LOCATION,
            http::HeaderValue::from_str(&location).unwrap_or_else(|_| http::HeaderValue::from_static("/")),
        )
        .body(crate::body::empty_body())
        .expect("status and header are valid")
}
