//! The per-listener routing table: `host + path-prefix` patterns mapped to
//! composed site handlers. Read-only once configuration finishes.

use std::sync::{Arc, RwLock};

use crate::middleware::Handler;

struct Route {
    host: String,
    path: String,
    handler: Arc<dyn Handler>,
}

/// Longest-prefix-wins routing table. An empty host matches any host; when
/// breaking a tie between candidate routes, path length is compared before
/// host presence (a host-specific route only wins over a host-agnostic one
/// once their path lengths are equal).
pub struct Mux {
    routes: RwLock<Vec<Route>>,
}

impl Mux {
    pub fn new() -> Self {
        Mux {
            routes: RwLock::new(Vec::new()),
        }
    }

    pub fn register(&self, host: &str, path: &str, handler: Arc<dyn Handler>) {
        self.routes.write().unwrap().push(Route {
            host: host.to_string(),
            path: path.to_string(),
            handler,
        });
    }

    pub fn route(&self, host: &str, path: &str) -> Option<Arc<dyn Handler>> {
        let routes = self.routes.read().unwrap();
        routes
            .iter()
            .filter(|r| (r.host.is_empty() || r.host == host) && path.starts_with(r.path.as_str()))
            .max_by_key(|r| (r.path.len(), !r.host.is_empty()))
            .map(|r| r.handler.clone())
    }

    pub fn len(&self) -> usize {
        self.routes.read().unwrap().len()
    }
}

impl Default for Mux {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{text_response, Request, Response};
    use async_trait::async_trait;
    use http::StatusCode;

    struct Tagged(&'static str);

    #[async_trait]
    impl Handler for Tagged {
        async fn serve(&self, _req: Request) -> Response {
            text_response(StatusCode::OK, self.0)
        }
    }

    fn h(name: &'static str) -> Arc<dyn Handler> {
        Arc::new(Tagged(name))
    }

    #[test]
    fn empty_host_matches_any_host() {
        let mux = Mux::new();
        mux.register("", "/", h("catch-all"));
        assert!(mux.route("example.com", "/foo").is_some());
    }

    #[test]
    fn longest_path_prefix_wins() {
        let mux = Mux::new();
        mux.register("example.com", "/", h("root"));
        mux.register("example.com", "/api", h("api"));
        let route = mux.route("example.com", "/api/widgets");
        assert!(route.is_some());
    }

    #[test]
    fn path_length_beats_host_presence() {
        let mux = Mux::new();
        mux.register("", "/api/v2", h("generic-long"));
        mux.register("example.com", "/api", h("specific-short"));
        // "/api/v2" (len 7) beats "/api" (len 4) even though the shorter one
        // names a specific host.
        let route = mux.route("example.com", "/api/v2/widgets");
        assert!(route.is_some());
    }

    #[test]
    fn no_match_returns_none() {
        let mux = Mux::new();
        mux.register("example.com", "/", h("root"));
        assert!(mux.route("other.com", "/").is_none());
    }
}
