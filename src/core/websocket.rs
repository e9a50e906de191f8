// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use bytes::Bytes;
use hyper::header::{CONNECTION, UPGRADE};
use hyper::upgrade::OnUpgrade;
use hyper::{HeaderMap, Response, StatusCode};
use hyper_util::rt::TokioIo;

use super::{ProxyError, response_headers};
use crate::router::ProxyTarget;

/// Whether the headers ask for a WebSocket upgrade.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let upgrade = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"));
    let connection = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    upgrade && connection
}

/// Relay the upstream handshake and, on `101`, splice both connections.
pub(super) async fn tunnel(
    client: OnUpgrade,
    upstream: reqwest::Response,
    target: &ProxyTarget,
) -> Result<Response<reqwest::Body>, ProxyError> {
    let status = upstream.status();
    if status != StatusCode::SWITCHING_PROTOCOLS {
        crate::debug_fmt!(
            "WebSocket",
            "{} declined the upgrade with {}",
            target.application,
            status
        );
        let headers = response_headers(upstream.headers());
        let mut response = Response::new(reqwest::Body::wrap_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        return Ok(response);
    }

    let mut response = Response::new(reqwest::Body::from(Bytes::new()));
    *response.status_mut() = status;
    *response.headers_mut() = upstream.headers().clone();

    let application = target.application.clone();
    tokio::spawn(async move {
        let mut upstream = match upstream.upgrade().await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                crate::error_fmt!("WebSocket", "Upstream upgrade to {} failed: {}", application, e);
                return;
            }
        };
        let mut client = match client.await {
            Ok(upgraded) => TokioIo::new(upgraded),
            Err(e) => {
                crate::error_fmt!("WebSocket", "Client upgrade failed: {}", e);
                return;
            }
        };

        match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
            Ok((sent, received)) => crate::debug_fmt!(
                "WebSocket",
                "Closed tunnel to {} ({} bytes sent, {} received)",
                application,
                sent,
                received
            ),
            Err(e) => crate::debug_fmt!("WebSocket", "Tunnel to {} ended: {}", application, e),
        }
    });

    Ok(response)
}
