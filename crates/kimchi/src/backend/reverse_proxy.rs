//! `reverse_proxy` backend: dials a single configured upstream over plain
//! HTTP/1.1 per request, rewriting scheme/authority, setting forwarding
//! headers, and stripping hop-by-hop headers in both directions.

use async_trait::async_trait;
use http::uri::{Authority, Scheme};
use http::{header, HeaderValue, StatusCode};
use http_body_util::BodyExt;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use super::{Handler, HOP_BY_HOP_HEADERS};
use crate::body::{text_response, Body, Request, Response};

pub struct ReverseProxy {
    scheme: Scheme,
    authority: Authority,
    client: Client<HttpConnector, Body>,
}

impl ReverseProxy {
    pub fn new(upstream: &url::Url) -> Result<Self, String> {
        let scheme = Scheme::try_from(upstream.scheme()).map_err(|e| e.to_string())?;
        let authority = upstream
            .host_str()
            .map(|host| match upstream.port() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            })
            .ok_or_else(|| "upstream URL has no host".to_string())?;
        let authority = Authority::try_from(authority).map_err(|e| e.to_string())?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(ReverseProxy {
            scheme,
            authority,
            client,
        })
    }
}

fn strip_hop_by_hop(headers: &mut http::HeaderMap) {
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

#[async_trait]
impl Handler for ReverseProxy {
    async fn serve(&self, req: Request) -> Response {
        let client_addr = req
            .extensions()
            .get::<crate::server::conn::ConnInfo>()
            .map(|info| info.remote_addr.to_string())
            .unwrap_or_default();
        let request_host = req
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let request_scheme = req.uri().scheme_str().unwrap_or("http").to_string();

        let (mut parts, body) = req.into_parts();

        let mut uri_parts = parts.uri.into_parts();
        uri_parts.scheme = Some(self.scheme.clone());
        uri_parts.authority = Some(self.authority.clone());
        if uri_parts.path_and_query.is_none() {
            uri_parts.path_and_query = Some(http::uri::PathAndQuery::from_static("/"));
        }
        let uri = match http::Uri::from_parts(uri_parts) {
            Ok(uri) => uri,
            Err(_) => return text_response(StatusCode::BAD_GATEWAY, "502 Bad Gateway"),
        };
        parts.uri = uri;

        strip_hop_by_hop(&mut parts.headers);

        parts.headers.insert(
            header::HeaderName::from_static("x-forwarded-for"),
            HeaderValue::from_str(&client_addr).unwrap_or_else(|_| HeaderValue::from_static("")),
        );
        parts.headers.insert(
            header::HeaderName::from_static("x-forwarded-host"),
            HeaderValue::from_str(&request_host).unwrap_or_else(|_| HeaderValue::from_static("")),
        );
        parts.headers.insert(
            header::HeaderName::from_static("x-forwarded-proto"),
            HeaderValue::from_str(&request_scheme).unwrap_or_else(|_| HeaderValue::from_static("http")),
        );
        let forwarded = format!(
            "for=\"{client_addr}\";host=\"{request_host}\";proto=\"{request_scheme}\""
        );
        parts.headers.insert(
            header::FORWARDED,
            HeaderValue::from_str(&forwarded).unwrap_or_else(|_| HeaderValue::from_static("")),
        );

        let upstream_req = http::Request::from_parts(parts, body);

        let upstream_resp = match self.client.request(upstream_req).await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::warn!(error = %err, "reverse_proxy upstream request failed");
                return text_response(StatusCode::BAD_GATEWAY, "502 Bad Gateway");
            }
        };

        let (mut resp_parts, resp_body) = upstream_resp.into_parts();
        strip_hop_by_hop(&mut resp_parts.headers);
        let body: Body = resp_body
            .map_err(|e| Box::new(e) as crate::body::BoxError)
            .boxed();
        http::Response::from_parts(resp_parts, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_scheme() {
        let url = url::Url::parse("ftp://example.com").unwrap();
        assert!(ReverseProxy::new(&url).is_err());
    }

    #[test]
    fn accepts_plain_http_upstream() {
        let url = url::Url::parse("http://upstream.internal:9000").unwrap();
        let proxy = ReverseProxy::new(&url);
        assert!(proxy.is_ok());
    }
}
