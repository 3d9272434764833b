//! The handler trait every backend and middleware implements, and the
//! composition helper that wraps a terminal backend in an ordered chain of
//! middlewares.

pub mod basic_auth;
pub mod header;

use std::sync::Arc;

use async_trait::async_trait;

use crate::body::{Request, Response};

/// A terminal backend or a middleware step. Middlewares call into an inner
/// handler after doing their own work; backends never call further.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn serve(&self, req: Request) -> Response;
}

/// A middleware is a function from (inner handler) to (new handler); the
/// new handler is free to run code before and/or after calling inner.
pub type MiddlewareFn = Box<dyn Fn(Arc<dyn Handler>) -> Arc<dyn Handler> + Send + Sync>;

/// Wraps `backend` with `middlewares` in declaration order: the first
/// declared middleware becomes the outermost handler, so its pre-inner code
/// runs first on the way in and its post-inner code runs last on the way
/// out.
pub fn compose(backend: Arc<dyn Handler>, middlewares: Vec<MiddlewareFn>) -> Arc<dyn Handler> {
    middlewares
        .into_iter()
        .rev()
        .fold(backend, |inner, wrap| wrap(inner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{text_response, Request, Response};
    use http::StatusCode;

    struct Terminal;

    #[async_trait]
    impl Handler for Terminal {
        async fn serve(&self, _req: Request) -> Response {
            text_response(StatusCode::OK, "terminal")
        }
    }

    struct Recording {
        inner: Arc<dyn Handler>,
        order: Arc<std::sync::Mutex<Vec<&'static str>>>,
        name: &'static str,
    }

    #[async_trait]
    impl Handler for Recording {
        async fn serve(&self, req: Request) -> Response {
            self.order.lock().unwrap().push(self.name);
            let resp = self.inner.serve(req).await;
            self.order
                .lock()
                .unwrap()
                .push(Box::leak(format!("{}-after", self.name).into_boxed_str()));
            resp
        }
    }

    #[tokio::test]
    async fn first_declared_middleware_is_outermost() {
        let order: Arc<std::sync::Mutex<Vec<&'static str>>> = Arc::new(std::sync::Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        let mw1: MiddlewareFn = Box::new(move |inner| {
            Arc::new(Recording {
                inner,
                order: o1.clone(),
                name: "first",
            })
        });
        let mw2: MiddlewareFn = Box::new(move |inner| {
            Arc::new(Recording {
                inner,
                order: o2.clone(),
                name: "second",
            })
        });

        let handler = compose(Arc::new(Terminal), vec![mw1, mw2]);
        let req = http::Request::builder()
            .body(crate::body::empty_body())
            .unwrap();
        handler.serve(req).await;

        let seen = order.lock().unwrap().clone();
        assert_eq!(seen[0], "first");
        assert_eq!(seen[1], "second");
    }
}
