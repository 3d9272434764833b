//! Tagged connections: a raw socket plus the per-connection metadata derived
//! from protocol detection, carried through to request handlers.

use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// The ALPN-ish protocol tag used for dispatch. An empty tag means
/// "unspecified; treat as HTTP/1", matching the wire behavior of a
/// connection with no PROXY header and no TLS-negotiated ALPN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proto {
    Unspecified,
    Http10,
    Http11,
    H2,
    H2c,
    Other(String),
}

impl Proto {
    pub fn from_alpn(s: &str) -> Proto {
        match s {
            "" => Proto::Unspecified,
            "http/1.0" => Proto::Http10,
            "http/1.1" => Proto::Http11,
            "h2" => Proto::H2,
            "h2c" => Proto::H2c,
            other => Proto::Other(other.to_string()),
        }
    }

    pub fn is_http2(&self) -> bool {
        matches!(self, Proto::H2 | Proto::H2c)
    }

    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            Proto::Unspecified | Proto::Http10 | Proto::Http11 | Proto::H2 | Proto::H2c
        )
    }
}

/// A synthesized TLS connection state. Non-nil iff the PROXY frontend
/// reported that it terminated a client TLS session (`PP2_TYPE_SSL`'s
/// `client` bit). Subfields are intentionally not populated; the presence
/// of this value is itself the signal handlers need.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsState {
    _private: (),
}

impl TlsState {
    pub fn synthesized() -> Self {
        TlsState { _private: () }
    }
}

/// The three pieces of per-connection metadata every handler can observe,
/// regardless of whether the connection arrived via the HTTP/1 or HTTP/2
/// path. Cloned onto the request as an extension by the listener's entry
/// handler.
#[derive(Debug, Clone)]
pub struct ConnInfo {
    pub proto: Proto,
    pub tls_state: Option<TlsState>,
    pub remote_addr: SocketAddr,
}

pin_project! {
    /// A connection decorated with fixed metadata determined once, at the
    /// moment of tagging, and never mutated afterwards. Reads and writes
    /// pass straight through to the underlying socket.
    pub struct TaggedConn {
        #[pin]
        inner: TcpStream,
        info: ConnInfo,
    }
}

impl TaggedConn {
    pub fn new(inner: TcpStream, info: ConnInfo) -> Self {
        TaggedConn { inner, info }
    }

    pub fn info(&self) -> ConnInfo {
        self.info.clone()
    }
}

impl AsyncRead for TaggedConn {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        self.project().inner.poll_read(cx, buf)
    }
}

impl AsyncWrite for TaggedConn {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[std::io::IoSlice<'_>],
    ) -> Poll<std::io::Result<usize>> {
        self.project().inner.poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }
}
