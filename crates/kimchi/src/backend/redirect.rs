//! `redirect` backend: issues a 302 to a configured target.

use async_trait::async_trait;
use http::{HeaderValue, StatusCode};

use super::Handler;
use crate::body::{empty_body, Request, Response};

pub struct Redirect {
    target: String,
}

impl Redirect {
    pub fn new(target: impl Into<String>) -> Self {
        Redirect {
            target: target.into(),
        }
    }

    /// A relative target is resolved against the request's scheme/host so
    /// the `Location` header is always an absolute URL.
    fn location_for(&self, req: &Request) -> String {
        if self.target.contains("://") {
            return self.target.clone();
        }
        let host = req
            .headers()
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let scheme = req.uri().scheme_str().unwrap_or("http");
        format!("{scheme}://{host}{}", self.target)
    }
}

#[async_trait]
impl Handler for Redirect {
    async fn serve(&self, req: Request) -> Response {
        let location = self.location_for(&req);
        http::Response::builder()
            .status(StatusCode::FOUND)
            .header(
                http::header::LOCATION,
                HeaderValue::from_str(&location).unwrap_or_else(|_| HeaderValue::from_static("/")),
            )
            .body(empty_body())
            .expect("status and header are valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn absolute_target_is_used_verbatim() {
        let backend = Redirect::new("https://other.example/path");
        let req = http::Request::builder().body(empty_body()).unwrap();
        let resp = backend.serve(req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(
            resp.headers().get(http::header::LOCATION).unwrap(),
            "https://other.example/path"
        );
    }

    #[tokio::test]
    async fn relative_target_is_resolved_against_request() {
        let backend = Redirect::new("/new-path");
        let req = http::Request::builder()
            .header(http::header::HOST, "example.com")
            .body(empty_body())
            .unwrap();
        let resp = backend.serve(req).await;
        assert_eq!(
            resp.headers().get(http::header::LOCATION).unwrap(),
            "http://example.com/new-path"
        );
    }
}
