//! End-to-end tests: write a real config file, start real listeners, and
//! drive them with real TCP connections, mirroring the scenarios in the
//! spec's testable-properties section.

use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn write_config(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("kimchi.conf");
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    path
}

async fn start(config_path: &std::path::Path) {
    let registry = kimchi::load_config(config_path).expect("config should load");
    registry.start().await.expect("listeners should start");
    // Give the accept loop a moment to actually bind before connecting.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn raw_request(port: u16, request: &str) -> String {
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    stream.write_all(request.as_bytes()).await.unwrap();
    stream.shutdown().await.ok();
    let mut buf = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut buf)).await;
    String::from_utf8_lossy(&buf).into_owned()
}

#[tokio::test]
async fn plaintext_request_redirects_to_https() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        "site http://example.com:18081 {\n    file_server /srv/www\n}\n",
    );
    start(&path).await;

    let resp = raw_request(
        18081,
        "GET / HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(resp.starts_with("HTTP/1.1 301"), "got: {resp}");
    assert!(resp.contains("location: https://example.com/") || resp.contains("Location: https://example.com/"));
}

#[tokio::test]
async fn insecure_site_serves_without_redirect() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("www");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("index.html"), b"<h1>hello</h1>").unwrap();

    let path = write_config(
        &dir,
        &format!(
            "site http+insecure://example.com:18082 {{\n    file_server {}\n}}\n",
            root.display()
        ),
    );
    start(&path).await;

    let resp = raw_request(
        18082,
        "GET / HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(resp.starts_with("HTTP/1.1 200"), "got: {resp}");
    assert!(resp.contains("hello"));
}

#[tokio::test]
async fn basic_auth_challenge_then_success() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("www");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("index.html"), b"secret").unwrap();

    let path = write_config(
        &dir,
        &format!(
            "site http+insecure://example.com:18083 {{\n    file_server {}\n    basic_auth alice hunter2\n}}\n",
            root.display()
        ),
    );
    start(&path).await;

    let unauthenticated = raw_request(
        18083,
        "GET / HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(unauthenticated.starts_with("HTTP/1.1 401"), "got: {unauthenticated}");
    assert!(unauthenticated.to_lowercase().contains("www-authenticate: basic"));

    use base64::Engine;
    let creds = base64::engine::general_purpose::STANDARD.encode(b"alice:hunter2");
    let authenticated = raw_request(
        18083,
        &format!(
            "GET / HTTP/1.1\r\nHost: example.com\r\nAuthorization: Basic {creds}\r\nConnection: close\r\n\r\n"
        ),
    )
    .await;
    assert!(authenticated.starts_with("HTTP/1.1 200"), "got: {authenticated}");
    assert!(authenticated.contains("secret"));
}

#[tokio::test]
async fn multiple_backends_in_one_site_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        "site http+insecure://example.com:18084 {\n    file_server /a\n    reverse_proxy http://upstream.invalid\n}\n",
    );
    let err = kimchi::load_config(&path).unwrap_err();
    assert!(err.to_string().contains("multiple HTTP backend directives provided"));
}

#[tokio::test]
async fn missing_backend_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "site http+insecure://example.com:18085 {\n    header X-Foo bar\n}\n");
    let err = kimchi::load_config(&path).unwrap_err();
    assert!(err.to_string().contains("no backend directive"));
}

#[tokio::test]
async fn unknown_directive_at_top_level_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "bogus_directive foo\n");
    assert!(kimchi::load_config(&path).is_err());
}
