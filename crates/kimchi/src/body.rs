//! Common request/response body and handler types shared across the crate.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};

/// Boxed error type used for the body's associated `Error`, matching the
/// pattern hyper's own examples use when a handler chain needs to unify
/// bodies coming from different sources (an incoming request, a file, an
/// upstream response) behind one concrete type.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A type-erased, boxed HTTP body used uniformly by every handler in the
/// chain so that middleware and backends don't need to be generic over the
/// concrete body type of whatever produced the request.
pub type Body = http_body_util::combinators::BoxBody<Bytes, BoxError>;

/// The request type handlers operate on, after the entry point has boxed the
/// incoming body.
pub type Request = http::Request<Body>;

/// The response type handlers return.
pub type Response = http::Response<Body>;

pub fn empty_body() -> Body {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed()
}

pub fn full_body(bytes: impl Into<Bytes>) -> Body {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn text_response(status: http::StatusCode, text: impl Into<String>) -> Response {
    http::Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(full_body(text.into()))
        .expect("status and header are valid")
}

pub fn not_found() -> Response {
    text_response(http::StatusCode::NOT_FOUND, "404 Not Found")
}
