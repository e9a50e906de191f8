// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Upstream forwarding.
//!
//! The router decides where a request goes; this module gets it there and
//! brings the response back. Bodies stream in both directions. Deployed
//! (https) and local (http) targets differ in how headers are prepared:
//!
//! * deployed: `Host` names the deployment, proxy cookies are stripped, an
//!   automation bypass secret is attached when configured, redirects back to
//!   the deployment are pointed at the proxy and SSO challenges become an
//!   interstitial page
//! * local: the proxy-origin marker, the explicit flag value and
//!   `x-forwarded-*` headers are added

pub mod auth;
mod websocket;

#[cfg(test)]
mod tests;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hyper::header::{
    CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, HeaderName, HeaderValue, LOCATION,
    SET_COOKIE, UPGRADE,
};
use hyper::{HeaderMap, Request, Response, StatusCode};
use thiserror::Error;

use crate::config::error::ConfigError;
use crate::overrides::is_override_cookie;
use crate::router::{FLAG_VALUE_HEADER, PROXY_ORIGIN_HEADER, ProxyRequestRouter, ProxyTarget};
use crate::routing::{Host, RoutingConfigError};
use auth::{BYPASS_HEADER, BypassSecrets, sso_interstitial, sso_nonce};

pub use websocket::is_websocket_upgrade;

/// Cookie enabling client-side routing diagnostics; never sent upstream.
pub const DEBUG_COOKIE: &str = "VERCEL_MFE_DEBUG";

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Errors that can occur during proxy operations.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// HTTP client error
    #[error("HTTP client error: {0}")]
    ClientError(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Routing configuration error
    #[error(transparent)]
    RoutingError(#[from] RoutingConfigError),

    /// The target could not be reached or answered with a broken response
    #[error("error proxying request to {application} at {host}: {message}")]
    Upstream {
        application: String,
        host: String,
        message: String,
    },

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<ConfigError> for ProxyError {
    fn from(err: ConfigError) -> Self {
        ProxyError::ConfigError(err.to_string())
    }
}

impl ProxyError {
    pub(crate) fn upstream(target: &ProxyTarget, err: impl std::fmt::Display) -> Self {
        ProxyError::Upstream {
            application: target.application.clone(),
            host: target.host.clone(),
            message: err.to_string(),
        }
    }
}

/// Time spent waiting for the upstream response head, carried in the
/// response extensions of forwarded requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamTiming(pub Duration);

/// Forwards requests to the targets chosen by the router.
#[derive(Debug, Clone)]
pub struct ProxyCore {
    router: Arc<ProxyRequestRouter>,
    /// Client for plain requests; redirects are handed back to the browser
    client: reqwest::Client,
    /// HTTP/1-only client, required for upgrades
    upgrade_client: reqwest::Client,
    /// Origin the browser uses to reach the proxy, e.g. `http://localhost:3024`
    proxy_origin: String,
    bypass: BypassSecrets,
}

impl ProxyCore {
    /// Create a forwarding core; bypass secrets are read from the environment.
    pub fn new(router: Arc<ProxyRequestRouter>, proxy_origin: impl Into<String>) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(ProxyError::ClientError)?;

        let upgrade_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .http1_only()
            .build()
            .map_err(ProxyError::ClientError)?;

        let bypass = BypassSecrets::from_env(router.config());

        Ok(Self {
            router,
            client,
            upgrade_client,
            proxy_origin: proxy_origin.into().trim_end_matches('/').to_string(),
            bypass,
        })
    }

    /// Replace the bypass secrets read at construction.
    pub fn with_bypass_secrets(mut self, bypass: BypassSecrets) -> Self {
        self.bypass = bypass;
        self
    }

    pub fn router(&self) -> &ProxyRequestRouter {
        &self.router
    }

    pub fn proxy_origin(&self) -> &str {
        &self.proxy_origin
    }

    /// Send `request` to `target` and stream the response back.
    pub async fn forward(
        &self,
        request: Request<reqwest::Body>,
        target: &ProxyTarget,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<reqwest::Body>, ProxyError> {
        let (parts, body) = request.into_parts();
        let return_to = format!(
            "{}{}",
            self.proxy_origin,
            parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
        );
        let headers = self.upstream_headers(&parts.headers, target, client_addr, false);

        let upstream_start = Instant::now();
        let resp = self
            .client
            .request(parts.method.clone(), &target.url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| ProxyError::upstream(target, e))?;
        let upstream_elapsed = upstream_start.elapsed();

        let status = resp.status();
        let mut headers = response_headers(resp.headers());

        if target.is_secure() {
            self.adapt_secure_headers(target, &mut headers);
            if let Some(page) = self.sso_page(status, &headers, target, &return_to) {
                crate::info_fmt!(
                    "Proxy",
                    "{} at {} requires authentication; serving sign-in page",
                    target.application,
                    target.host
                );
                let mut response = html_response(status, headers, page);
                response.extensions_mut().insert(UpstreamTiming(upstream_elapsed));
                return Ok(response);
            }
        }

        log_timing(&parts.method, target, status, upstream_elapsed);

        let mut response = Response::new(reqwest::Body::wrap_stream(resp.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response.extensions_mut().insert(UpstreamTiming(upstream_elapsed));
        Ok(response)
    }

    /// Tunnel a WebSocket upgrade to `target`.
    ///
    /// Answers the client with the upstream handshake response; once both
    /// sides have upgraded, bytes are copied until either closes.
    pub async fn forward_websocket<B>(
        &self,
        mut request: Request<B>,
        target: &ProxyTarget,
        client_addr: Option<SocketAddr>,
    ) -> Result<Response<reqwest::Body>, ProxyError> {
        let on_upgrade = hyper::upgrade::on(&mut request);
        let headers = self.upstream_headers(request.headers(), target, client_addr, true);

        let upstream_start = Instant::now();
        let resp = self
            .upgrade_client
            .request(request.method().clone(), &target.url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| ProxyError::upstream(target, e))?;
        let upstream_elapsed = upstream_start.elapsed();

        let mut response = websocket::tunnel(on_upgrade, resp, target).await?;
        response.extensions_mut().insert(UpstreamTiming(upstream_elapsed));
        Ok(response)
    }

    /// Headers sent upstream for `incoming`.
    pub(crate) fn upstream_headers(
        &self,
        incoming: &HeaderMap,
        target: &ProxyTarget,
        client_addr: Option<SocketAddr>,
        upgrade: bool,
    ) -> HeaderMap {
        let mut headers = incoming.clone();
        let original_host = incoming.get(HOST).cloned();
        strip_hop_by_hop(&mut headers, upgrade);

        headers.insert(
            HeaderName::from_static(PROXY_ORIGIN_HEADER),
            HeaderValue::from_static("1"),
        );

        if target.is_secure() {
            headers.remove(HOST);
            let authority = Host::new(target.protocol, target.host.as_str(), Some(target.port)).authority();
            if let Ok(value) = HeaderValue::from_str(&authority) {
                headers.insert(HOST, value);
            }
            strip_proxy_cookies(&mut headers);
            if let Some(secret) = self.bypass.get(&target.application) {
                if let Ok(value) = HeaderValue::from_str(secret) {
                    headers.insert(HeaderName::from_static(BYPASS_HEADER), value);
                }
            }
        } else {
            if let Some(flag) = target.flag_value {
                headers.insert(
                    HeaderName::from_static(FLAG_VALUE_HEADER),
                    HeaderValue::from_static(if flag { "true" } else { "false" }),
                );
            }
            add_forwarded_headers(&mut headers, original_host, client_addr);
        }

        headers
    }

    /// Point deployment redirects at the proxy and keep deployment cookies
    /// on the proxy origin.
    pub(crate) fn adapt_secure_headers(&self, target: &ProxyTarget, headers: &mut HeaderMap) {
        if let Some(location) = headers.get(LOCATION).and_then(|v| v.to_str().ok()) {
            if let Some(rewritten) = rewrite_location(location, target, &self.proxy_origin) {
                crate::debug_fmt!("Proxy", "Rewriting redirect {} -> {}", location, rewritten);
                if let Ok(value) = HeaderValue::from_str(&rewritten) {
                    headers.insert(LOCATION, value);
                }
            }
        }

        let cookies: Vec<HeaderValue> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|value| {
                value
                    .to_str()
                    .ok()
                    .and_then(strip_cookie_domain)
                    .and_then(|cookie| HeaderValue::from_str(&cookie).ok())
                    .unwrap_or_else(|| value.clone())
            })
            .collect();
        if !cookies.is_empty() {
            headers.remove(SET_COOKIE);
            for cookie in cookies {
                headers.append(SET_COOKIE, cookie);
            }
        }
    }

    /// Interstitial page for an SSO challenge, if `status` is one.
    pub(crate) fn sso_page(
        &self,
        status: StatusCode,
        headers: &HeaderMap,
        target: &ProxyTarget,
        return_to: &str,
    ) -> Option<String> {
        if status != StatusCode::UNAUTHORIZED {
            return None;
        }
        let nonce = sso_nonce(headers.get_all(SET_COOKIE).iter().filter_map(|v| v.to_str().ok()))?;
        Some(sso_interstitial(target, &nonce, return_to))
    }
}

/// Copy of an upstream response's headers without hop-by-hop fields.
fn response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = upstream.clone();
    strip_hop_by_hop(&mut headers, false);
    headers
}

/// Remove hop-by-hop headers, including any named by `Connection`.
/// `Connection` and `Upgrade` survive when `upgrade` is set.
pub(crate) fn strip_hop_by_hop(headers: &mut HeaderMap, upgrade: bool) {
    let named: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty() && !(upgrade && name == "upgrade"))
        .collect();
    for name in named {
        headers.remove(name.as_str());
    }

    for name in HOP_BY_HOP {
        if upgrade && (name == CONNECTION.as_str() || name == UPGRADE.as_str()) {
            continue;
        }
        headers.remove(name);
    }
}

/// Drop override and debug cookies from the `Cookie` header, keeping the
/// remaining pairs as sent.
pub(crate) fn strip_proxy_cookies(headers: &mut HeaderMap) {
    let values: Vec<String> = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .map(str::trim)
        .filter(|pair| {
            let name = pair.split_once('=').map(|(name, _)| name).unwrap_or(pair).trim();
            !pair.is_empty() && !is_override_cookie(name) && name != DEBUG_COOKIE
        })
        .map(str::to_string)
        .collect();

    headers.remove(COOKIE);
    if values.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&values.join("; ")) {
        headers.insert(COOKIE, value);
    }
}

fn add_forwarded_headers(headers: &mut HeaderMap, host: Option<HeaderValue>, client_addr: Option<SocketAddr>) {
    if let Some(host) = host {
        headers
            .entry(HeaderName::from_static("x-forwarded-host"))
            .or_insert(host);
    }
    headers
        .entry(HeaderName::from_static("x-forwarded-proto"))
        .or_insert(HeaderValue::from_static("http"));

    if let Some(addr) = client_addr {
        let forwarded_for = HeaderName::from_static("x-forwarded-for");
        let value = match headers.get(&forwarded_for).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{}, {}", existing, addr.ip()),
            None => addr.ip().to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(forwarded_for, value);
        }
    }
}

/// Proxy-relative form of `location` when it points at the target host.
pub(crate) fn rewrite_location(location: &str, target: &ProxyTarget, proxy_origin: &str) -> Option<String> {
    let url = url::Url::parse(location).ok()?;
    if url.host_str()? != target.host {
        return None;
    }

    let mut rewritten = format!("{}{}", proxy_origin.trim_end_matches('/'), url.path());
    if let Some(query) = url.query() {
        rewritten.push('?');
        rewritten.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        rewritten.push('#');
        rewritten.push_str(fragment);
    }
    Some(rewritten)
}

/// `Set-Cookie` value without its `Domain` attribute; `None` when it has none.
fn strip_cookie_domain(value: &str) -> Option<String> {
    let mut cookie = cookie::Cookie::parse(value).ok()?;
    cookie.domain()?;
    cookie.unset_domain();
    Some(cookie.to_string())
}

fn html_response(status: StatusCode, mut headers: HeaderMap, page: String) -> Response<reqwest::Body> {
    headers.remove(CONTENT_LENGTH);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    let mut response = Response::new(reqwest::Body::from(page));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn log_timing(method: &hyper::Method, target: &ProxyTarget, status: StatusCode, upstream: Duration) {
    log::debug!(
        "[timing] {} {} -> {} | application={} upstream={:?}",
        method,
        target.url,
        status.as_u16(),
        target.application,
        upstream
    );
}
