//! A configurable HTTP reverse-proxy and static-file gateway.
//!
//! Operators declare *sites* in a block-structured configuration file: a
//! virtual host (scheme, authority, path prefix) bound to a terminal
//! backend (static files, an upstream reverse proxy, or a redirect) wrapped
//! by an ordered chain of middlewares. One process multiplexes any number
//! of TCP listeners, each dispatching accepted connections through PROXY
//! protocol decoding and HTTP/1 vs HTTP/2 (including h2c) selection before
//! routing to the configured handler chain.

pub mod backend;
pub mod body;
pub mod config;
pub mod error;
pub mod middleware;
pub mod server;

pub use error::{ConfigError, ConnectionError, FatalError};
pub use server::ServerRegistry;

use std::path::Path;

/// Loads `path`, resolving `import` directives, and registers every `site`
/// onto a fresh `ServerRegistry`. Does not start the listeners; call
/// `ServerRegistry::start` once ready.
pub fn load_config(path: &Path) -> Result<ServerRegistry, ConfigError> {
    let top_level = config::load(path)?;
    let registry = ServerRegistry::new();
    server::router::build(&registry, &top_level)?;
    Ok(registry)
}
