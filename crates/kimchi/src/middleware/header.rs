//! `header` middleware: sets fixed response headers.

use std::sync::Arc;

use async_trait::async_trait;
use http::{HeaderName, HeaderValue};

use super::Handler;
use crate::body::{Request, Response};

pub struct HeaderMiddleware {
    inner: Arc<dyn Handler>,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl HeaderMiddleware {
    pub fn new(inner: Arc<dyn Handler>, headers: Vec<(HeaderName, HeaderValue)>) -> Self {
        HeaderMiddleware { inner, headers }
    }
}

#[async_trait]
impl Handler for HeaderMiddleware {
    async fn serve(&self, req: Request) -> Response {
        let mut resp = self.inner.serve(req).await;
        for (name, value) in &self.headers {
            resp.headers_mut().insert(name.clone(), value.clone());
        }
        resp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::{empty_body, text_response};
    use http::StatusCode;

    struct Ok200;

    #[async_trait]
    impl Handler for Ok200 {
        async fn serve(&self, _req: Request) -> Response {
            text_response(StatusCode::OK, "hi")
        }
    }

    #[tokio::test]
    async fn sets_configured_header_on_response() {
        let headers = vec![(
            HeaderName::from_static("x-powered-by"),
            HeaderValue::from_static("kimchi"),
        )];
        let mw = HeaderMiddleware::new(Arc::new(Ok200), headers);
        let req = http::Request::builder().body(empty_body()).unwrap();
        let resp = mw.serve(req).await;
        assert_eq!(resp.headers().get("x-powered-by").unwrap(), "kimchi");
    }

    #[tokio::test]
    async fn overwrites_existing_header_value() {
        let headers = vec![(
            HeaderName::from_static("x-powered-by"),
            HeaderValue::from_static("kimchi"),
        )];
        let mw = HeaderMiddleware::new(Arc::new(Ok200), headers);
        let req = http::Request::builder().body(empty_body()).unwrap();
        let resp = mw.serve(req).await;
        assert_eq!(resp.headers().get_all("x-powered-by").iter().count(), 1);
    }
}
