// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end tests: a real proxy in front of mock local applications.

mod common;

use std::net::TcpListener;

use microfrontends::LocalProxy;
use microfrontends::overrides::override_cookie_name;
use reqwest::StatusCode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{client, routing_document, spawn_proxy, write_config};

fn unused_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Read an HTTP message head byte by byte, leaving later bytes unread.
async fn read_head(stream: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        assert!(n > 0, "connection closed inside the message head");
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

/// Upstream that accepts one WebSocket handshake, reports the request head
/// and echoes every byte afterwards.
async fn spawn_echo_upstream() -> (String, oneshot::Receiver<String>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (head_tx, head_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let head = read_head(&mut stream).await;
        let _ = head_tx.send(head);

        stream
            .write_all(
                b"HTTP/1.1 101 Switching Protocols\r\n\
                  Upgrade: websocket\r\n\
                  Connection: Upgrade\r\n\
                  Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n",
            )
            .await
            .unwrap();

        let mut buf = [0u8; 1024];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if stream.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    (format!("http://{addr}"), head_rx)
}

fn build_proxy(web_local: &str, docs_local: &str, local_apps: &[&str]) -> (LocalProxy, tempfile::NamedTempFile) {
    let file = write_config(
        ".json",
        &routing_document(web_local, docs_local).to_string(),
    );
    let proxy = LocalProxy::loader()
        .with_config_file(file.path().to_str().unwrap())
        .with_local_apps(local_apps.iter().copied())
        .with_port(0)
        .build()
        .unwrap();
    (proxy, file)
}

#[tokio::test]
async fn test_routing_endpoint_over_http() {
    let (proxy, _file) = build_proxy("3000", "3100", &["docs"]);
    let running = spawn_proxy(&proxy).await;

    let json: serde_json::Value = client()
        .get(running.url("/.well-known/vercel/microfrontends/routing"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(json["docs"]["routing"]["host"], "localhost");
    assert_eq!(json["docs"]["routing"]["port"], 3100);
    assert_eq!(json["web"]["routing"]["host"], "web.example.com");
    assert_eq!(json["web"]["routing"]["protocol"], "https");

    running.stop().await;
}

#[tokio::test]
async fn test_path_routing_to_local_applications() {
    let web = MockServer::start().await;
    let docs = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("x-vercel-mfe-local-proxy-origin", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("web home"))
        .mount(&web)
        .await;
    Mock::given(method("GET"))
        .and(path("/docs/getting-started"))
        .and(query_param("lang", "en"))
        .and(header("x-vercel-mfe-local-proxy-origin", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("docs page"))
        .mount(&docs)
        .await;

    let (proxy, _file) = build_proxy(&web.uri(), &docs.uri(), &["web", "docs"]);
    let running = spawn_proxy(&proxy).await;
    let client = client();

    let body = client.get(running.url("/")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "web home");

    let resp = client
        .get(running.url("/docs/getting-started?lang=en"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-trace-id"));
    assert_eq!(resp.text().await.unwrap(), "docs page");

    running.stop().await;
}

#[tokio::test]
async fn test_flag_value_forwarded_as_header() {
    let web = MockServer::start().await;
    let docs = MockServer::start().await;

    Mock::given(path("/blog/launch"))
        .and(header("x-vercel-mfe-flag-value", "true"))
        .and(query_param_is_missing("vercel-mfe-flag-value"))
        .and(query_param("ref", "home"))
        .respond_with(ResponseTemplate::new(200).set_body_string("new blog"))
        .expect(1)
        .mount(&docs)
        .await;
    Mock::given(path("/blog/launch"))
        .respond_with(ResponseTemplate::new(200).set_body_string("old blog"))
        .expect(1)
        .mount(&web)
        .await;

    let (proxy, _file) = build_proxy(&web.uri(), &docs.uri(), &["web", "docs"]);
    let running = spawn_proxy(&proxy).await;
    let client = client();

    // flag on: the gated group wins
    let body = client
        .get(running.url("/blog/launch?vercel-mfe-flag-value=true&ref=home"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "new blog");

    // no flag value: deferred to the default application
    let body = client
        .get(running.url("/blog/launch"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "old blog");

    running.stop().await;
}

#[tokio::test]
async fn test_zone_header_selects_application() {
    let web = MockServer::start().await;
    let docs = MockServer::start().await;

    Mock::given(path("/pricing"))
        .respond_with(ResponseTemplate::new(200).set_body_string("docs pricing"))
        .mount(&docs)
        .await;

    let (proxy, _file) = build_proxy(&web.uri(), &docs.uri(), &["web", "docs"]);
    let running = spawn_proxy(&proxy).await;

    let body = client()
        .get(running.url("/pricing"))
        .header("x-vercel-mfe-zone", "docs")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "docs pricing");

    running.stop().await;
}

#[tokio::test]
async fn test_override_cookie_redirects_application() {
    let branch = MockServer::start().await;
    Mock::given(path("/docs"))
        .and(header("x-vercel-mfe-local-proxy-origin", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("branch docs"))
        .mount(&branch)
        .await;

    // docs is not running locally; the cookie points it at the branch server
    let (proxy, _file) = build_proxy("3000", "3100", &[]);
    let running = spawn_proxy(&proxy).await;

    let cookie = format!(
        "{}={}",
        override_cookie_name("docs"),
        urlencoding::encode(&branch.uri())
    );
    let body = client()
        .get(running.url("/docs"))
        .header("cookie", cookie)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "branch docs");

    running.stop().await;
}

#[tokio::test]
async fn test_repeated_slashes_are_redirected() {
    let (proxy, _file) = build_proxy("3000", "3100", &["docs"]);
    let running = spawn_proxy(&proxy).await;

    let resp = client()
        .get(running.url("//docs//guide?x=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(resp.headers()["location"], "/docs/guide?x=1");

    running.stop().await;
}

#[tokio::test]
async fn test_unreachable_application_is_500() {
    let port = unused_port();
    let (proxy, _file) = build_proxy("3000", &format!("http://127.0.0.1:{port}"), &["docs"]);
    let running = spawn_proxy(&proxy).await;

    let resp = client().get(running.url("/docs")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = resp.text().await.unwrap();
    assert!(body.contains("docs"));
    assert!(body.contains("127.0.0.1"));

    // the proxy keeps serving after an upstream failure
    let resp = client()
        .get(running.url("/.well-known/vercel/microfrontends/routing"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    running.stop().await;
}

#[tokio::test]
async fn test_websocket_upgrade_is_tunnelled() {
    let (docs_url, head_rx) = spawn_echo_upstream().await;
    let (proxy, _file) = build_proxy("3000", &docs_url, &["docs"]);
    let running = spawn_proxy(&proxy).await;

    let mut client = TcpStream::connect(running.addr).await.unwrap();
    client
        .write_all(
            format!(
                "GET /docs/socket HTTP/1.1\r\n\
                 Host: {}\r\n\
                 Connection: Upgrade\r\n\
                 Upgrade: websocket\r\n\
                 Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
                 Sec-WebSocket-Version: 13\r\n\r\n",
                running.addr
            )
            .as_bytes(),
        )
        .await
        .unwrap();

    let response = read_head(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 101"), "unexpected response: {response}");

    let upstream_head = head_rx.await.unwrap().to_ascii_lowercase();
    assert!(upstream_head.starts_with("get /docs/socket http/1.1"));
    assert!(upstream_head.contains("x-vercel-mfe-local-proxy-origin: 1"));
    assert!(upstream_head.contains("upgrade: websocket"));

    client.write_all(b"ping over the tunnel").await.unwrap();
    let mut echoed = [0u8; 20];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"ping over the tunnel");

    drop(client);
    running.stop().await;
}
