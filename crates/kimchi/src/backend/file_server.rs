//! `file_server` backend: serves static files from a root directory, with
//! directory listing gated behind an explicit `browse` marker and
//! path-traversal-safe resolution.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use http::{header, StatusCode};
use http_body_util::BodyExt;
use percent_encoding::percent_decode_str;
use tokio_util::io::ReaderStream;

use super::Handler;
use crate::body::{empty_body, full_body, not_found, text_response, Body, Request, Response};

pub struct FileServer {
    root: PathBuf,
    browse: bool,
}

impl FileServer {
    pub fn new(root: impl Into<PathBuf>, browse: bool) -> Self {
        FileServer {
            root: root.into(),
            browse,
        }
    }

    /// Joins the request path onto the root after percent-decoding and
    /// dropping `.`/`..` segments, so the result can never climb above
    /// `root` no matter what the request asked for. A request that would
    /// have escaped simply resolves to the root-relative path with the
    /// climbing segments removed, which in practice almost always yields a
    /// path that doesn't exist — handled as 404 by the caller, not as a
    /// distinguishable error.
    fn resolve(&self, request_path: &str) -> PathBuf {
        let decoded = percent_decode_str(request_path).decode_utf8_lossy();
        let mut resolved = self.root.clone();
        for component in Path::new(decoded.as_ref()).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    // Dropped: a leading '/' is inherent to the request path, and
                    // '..' must never be allowed to climb out of the root.
                }
            }
        }
        resolved
    }
}

#[async_trait]
impl Handler for FileServer {
    async fn serve(&self, req: Request) -> Response {
        let path = self.resolve(req.uri().path());

        let metadata = match fs_err::tokio::metadata(&path).await {
            Ok(m) => m,
            Err(_) => return not_found(),
        };

        if metadata.is_dir() {
            return self.serve_dir(&path, &req).await;
        }

        serve_file(&path, &metadata, &req).await
    }
}

impl FileServer {
    async fn serve_dir(&self, dir: &Path, req: &Request) -> Response {
        if !self.browse {
            return text_response(StatusCode::FORBIDDEN, "403 Forbidden");
        }

        let index = dir.join("index.html");
        if let Ok(meta) = fs_err::tokio::metadata(&index).await {
            if meta.is_file() {
                return serve_file(&index, &meta, req).await;
            }
        }

        match render_listing(dir).await {
            Ok(html) => http::Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
                .body(full_body(html))
                .expect("status and header are valid"),
            Err(_) => not_found(),
        }
    }
}

async fn render_listing(dir: &Path) -> std::io::Result<String> {
    let mut entries = fs_err::tokio::read_dir(dir).await?;
    let mut rows = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let meta = entry.metadata().await?;
        if meta.is_dir() {
            rows.push(format!(
                "<li><a href=\"{name}/\">{name}/</a></li>",
                name = html_escape(&name)
            ));
        } else {
            rows.push(format!(
                "<li><a href=\"{name}\">{name}</a> ({size} bytes)</li>",
                name = html_escape(&name),
                size = meta.len()
            ));
        }
    }
    rows.sort();
    Ok(format!(
        "<!DOCTYPE html><html><body><ul>{}</ul></body></html>",
        rows.join("")
    ))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

async fn serve_file(path: &Path, metadata: &std::fs::Metadata, req: &Request) -> Response {
    let modified = match metadata.modified() {
        Ok(m) => m,
        Err(_) => return not_found(),
    };

    if let Some(since) = req
        .headers()
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
    {
        if modified <= since {
            return http::Response::builder()
                .status(StatusCode::NOT_MODIFIED)
                .body(empty_body())
                .expect("status is valid");
        }
    }

    let file = match fs_err::tokio::File::open(path).await {
        Ok(f) => f,
        Err(_) => return not_found(),
    };

    let content_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string();

    let body: Body = http_body_util::StreamBody::new(ReaderStream::new(file).map(|chunk| {
        chunk
            .map(http_body::Frame::data)
            .map_err(|e| Box::new(e) as crate::body::BoxError)
    }))
    .boxed();

    http::Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, metadata.len())
        .header(header::LAST_MODIFIED, httpdate::fmt_http_date(modified))
        .body(body)
        .expect("headers are valid")
}
