// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Responses the proxy produces itself.

use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE, HOST, HeaderValue, LOCATION};
use hyper::{HeaderMap, Response, StatusCode, Uri};
use indexmap::IndexMap;
use serde::Serialize;

use crate::router::ProxyRequestRouter;
use crate::routing::{ClientConfigResponse, ClientViewOptions, Protocol};

pub const ROUTING_INFO_PATH: &str = "/.well-known/vercel/microfrontends/routing";
pub const CLIENT_CONFIG_PATH: &str = "/.well-known/vercel/microfrontends/client-config";

/// Applications listed individually in the startup summary.
const SUMMARY_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
struct RoutingEntry {
    routing: Endpoint,
}

#[derive(Debug, Serialize)]
struct Endpoint {
    host: String,
    port: u16,
    protocol: Protocol,
}

/// Where each application is currently reached, keyed by name.
pub fn routing_info(router: &ProxyRequestRouter) -> serde_json::Value {
    let entries: IndexMap<&str, RoutingEntry> = router
        .config()
        .applications()
        .iter()
        .map(|app| {
            let target = router.target_for_application(app, "/");
            (
                app.name(),
                RoutingEntry {
                    routing: Endpoint {
                        host: target.host,
                        port: target.port,
                        protocol: target.protocol,
                    },
                },
            )
        })
        .collect();
    serde_json::to_value(entries).unwrap_or_default()
}

pub fn client_config(router: &ProxyRequestRouter) -> serde_json::Value {
    let body = ClientConfigResponse {
        config: router.config().to_client_view(ClientViewOptions::default()),
    };
    serde_json::to_value(body).unwrap_or_default()
}

pub fn json_response(value: &serde_json::Value) -> Response<reqwest::Body> {
    let mut response = Response::new(reqwest::Body::from(value.to_string()));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

pub fn text_response(status: StatusCode, message: impl Into<String>) -> Response<reqwest::Body> {
    let mut response = Response::new(reqwest::Body::from(message.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

/// `uri`'s path and query with runs of `/` collapsed, when there are any.
pub fn collapse_slashes(uri: &Uri) -> Option<String> {
    let path = uri.path();
    if !path.contains("//") {
        return None;
    }

    let mut collapsed = String::with_capacity(path.len());
    for c in path.chars() {
        if c == '/' && collapsed.ends_with('/') {
            continue;
        }
        collapsed.push(c);
    }
    if let Some(query) = uri.query() {
        collapsed.push('?');
        collapsed.push_str(query);
    }
    Some(collapsed)
}

/// Permanent redirect to `location` echoing the request headers.
pub fn normalize_redirect(location: &str, request_headers: &HeaderMap) -> Response<reqwest::Body> {
    let mut headers = request_headers.clone();
    crate::core::strip_hop_by_hop(&mut headers, false);
    headers.remove(HOST);
    headers.remove(CONTENT_LENGTH);
    headers.remove(CONTENT_TYPE);
    if let Ok(value) = HeaderValue::from_str(location) {
        headers.insert(LOCATION, value);
    }

    let mut response = Response::new(reqwest::Body::from(""));
    *response.status_mut() = StatusCode::PERMANENT_REDIRECT;
    *response.headers_mut() = headers;
    response
}

/// Human-readable summary of where each application is served from.
pub fn startup_summary(router: &ProxyRequestRouter, port: u16) -> Vec<String> {
    let applications = router.config().applications();
    let mut lines = Vec::with_capacity(applications.len().min(SUMMARY_LIMIT) + 2);
    lines.push(format!("Microfrontends proxy running on http://localhost:{port}"));

    for app in applications.iter().take(SUMMARY_LIMIT) {
        let target = router.target_for_application(app, "");
        let place = if target.is_local { "local" } else { "fallback" };
        lines.push(format!("  {} -> {} ({})", app.name(), target.url, place));
    }
    if applications.len() > SUMMARY_LIMIT {
        lines.push(format!("  ... and {} more", applications.len() - SUMMARY_LIMIT));
    }
    lines
}
