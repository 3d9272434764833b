//! `basic_auth` middleware: HTTP Basic authentication against a single
//! configured username/password, compared in constant time so that a
//! response's latency cannot be used to learn which half of the credential
//! was wrong.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use http::{HeaderValue, StatusCode};
use subtle::ConstantTimeEq;

use super::Handler;
use crate::body::{text_response, Request, Response};

pub struct BasicAuth {
    inner: Arc<dyn Handler>,
    username: String,
    password: String,
    realm: String,
}

impl BasicAuth {
    pub fn new(inner: Arc<dyn Handler>, username: String, password: String) -> Self {
        BasicAuth {
            inner,
            username,
            password,
            realm: "Restricted".to_string(),
        }
    }

    /// Both halves of the credential are compared unconditionally, combined
    /// with a constant-time AND rather than `&&`, so the function takes the
    /// same path regardless of which one (if either) failed.
    fn credentials_match(&self, user: &str, pass: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(user.as_bytes());
        let pass_ok = self.password.as_bytes().ct_eq(pass.as_bytes());
        (user_ok & pass_ok).into()
    }

    fn unauthorized(&self) -> Response {
        let mut resp = text_response(StatusCode::UNAUTHORIZED, "401 Unauthorized");
        let challenge = format!("Basic realm={:?}", self.realm);
        resp.headers_mut().insert(
            http::header::WWW_AUTHENTICATE,
            HeaderValue::from_str(&challenge).expect("realm has no control characters"),
        );
        resp
    }
}

fn parse_basic_header(value: &HeaderValue) -> Option<(String, String)> {
    let value = value.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

#[async_trait]
impl Handler for BasicAuth {
    async fn serve(&self, req: Request) -> Response {
        let creds = req
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(parse_basic_header);

        match creds {
            Some((user, pass)) if self.credentials_match(&user, &pass) => {
                self.inner.serve(req).await
            }
            _ => self.unauthorized(),
        }
    }
}
