//! Terminal backends: `file_server`, `reverse_proxy`, `redirect`.

pub mod file_server;
pub mod redirect;
pub mod reverse_proxy;

pub use file_server::FileServer;
pub use redirect::Redirect;
pub use reverse_proxy::ReverseProxy;

pub(crate) use crate::middleware::Handler;

/// Hop-by-hop headers, stripped on both legs of `reverse_proxy` per RFC 7230
/// §6.1. Not specific to reverse_proxy conceptually, but this is currently
/// the only backend that talks to a second HTTP connection.
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
];
