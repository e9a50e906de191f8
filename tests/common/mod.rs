// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Common helpers for the proxy integration tests.

use std::io::Write;
use std::net::SocketAddr;

use microfrontends::{LocalProxy, ProxyError};
use serde_json::{Value, json};
use tempfile::NamedTempFile;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A proxy serving on an ephemeral port until [`RunningProxy::stop`].
#[allow(dead_code)]
pub struct RunningProxy {
    pub addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), ProxyError>>,
}

#[allow(dead_code)]
impl RunningProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger graceful shutdown and wait for the server to drain.
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        self.handle
            .await
            .expect("server task panicked")
            .expect("server failed");
    }
}

/// Bind the proxy's listener and serve it in the background.
pub async fn spawn_proxy(proxy: &LocalProxy) -> RunningProxy {
    let server = proxy.server().clone();
    let listener = server.bind().await.expect("bind proxy");
    let addr = listener.local_addr().expect("local addr");

    let (shutdown, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        server
            .serve(listener, async {
                let _ = rx.await;
            })
            .await
    });

    RunningProxy {
        addr,
        shutdown,
        handle,
    }
}

/// Routing document with a default `web` app and a `docs` child.
///
/// `web_local` / `docs_local` are the development hosts of each app.
#[allow(dead_code)]
pub fn routing_document(web_local: &str, docs_local: &str) -> Value {
    json!({
        "$schema": "https://openapi.vercel.sh/microfrontends.json",
        "applications": {
            "web": {
                "development": { "local": web_local, "fallback": "web.example.com" }
            },
            "docs": {
                "packageName": "@acme/docs",
                "development": { "local": docs_local, "fallback": "docs.example.com" },
                "routing": [
                    { "group": "docs", "paths": ["/docs", "/docs/:path*"] },
                    { "flag": "new-blog", "paths": ["/blog/:path*"] }
                ]
            }
        },
        "host": "127.0.0.1"
    })
}

/// Write `content` to a temporary file with the given suffix.
#[allow(dead_code)]
pub fn write_config(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

/// Client that hands redirects back instead of following them.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("build client")
}
