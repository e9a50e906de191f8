// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Request router: turns an incoming request into exactly one upstream
//! [`ProxyTarget`].
//!
//! Checks run in a fixed order and the first hit wins:
//!
//! | step | check                                  | target                                   |
//! |------|----------------------------------------|------------------------------------------|
//! | 1    | `vercel-mfe-flag-value` query / header | stripped, remembered for step 5          |
//! | 2    | auth, SSO and JWT paths                | default fallback over https:443          |
//! | 3    | asset prefix, overlay, source map, image | owning application                     |
//! | 4    | `x-vercel-mfe-zone` header             | named application                        |
//! | 5    | path groups in declaration order       | matching application, or deferred        |
//! | 6    | nothing matched                        | default application                      |
//!
//! Resolution is synchronous and never fails; unknown input degrades to the
//! default application.

pub mod builtin;
mod flags;


pub use flags::FlagEvaluator;

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;

use cookie::Cookie;
use hyper::header::{COOKIE, REFERER};
use hyper::{HeaderMap, Uri};
use serde::Serialize;
use url::form_urlencoded;

use crate::overrides::{OverridesConfig, is_override_cookie};
use crate::routing::{Application, Host, MicrofrontendsConfig, Protocol};
use builtin::{PlatformPath, first_segment, query_param, referer_path};

/// Query parameter forcing flag-gated groups on or off.
pub const FLAG_VALUE_QUERY_PARAM: &str = "vercel-mfe-flag-value";
/// Header form of [`FLAG_VALUE_QUERY_PARAM`], survives rewrites.
pub const FLAG_VALUE_HEADER: &str = "x-vercel-mfe-flag-value";
/// Header naming the target application directly.
pub const ZONE_HEADER: &str = "x-vercel-mfe-zone";
/// Header set on everything the local proxy forwards.
pub const PROXY_ORIGIN_HEADER: &str = "x-vercel-mfe-local-proxy-origin";

/// The parts of an HTTP request routing looks at.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    cookies: Vec<Cookie<'static>>,
}

impl RouteRequest {
    /// Request for `path_and_query` with no headers or cookies.
    pub fn new(path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (path_and_query, None),
        };
        let path = path.split('#').next().unwrap_or(path);
        Self {
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            query,
            ..Self::default()
        }
    }

    /// Build from a request URI and its headers, parsing the `Cookie` header.
    pub fn from_parts(uri: &Uri, headers: &HeaderMap) -> Self {
        let cookies = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| Cookie::split_parse(value.to_string()))
            .filter_map(Result::ok)
            .collect();

        Self {
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            headers: headers.clone(),
            cookies,
        }
    }

    /// Add a header; invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            hyper::header::HeaderName::from_bytes(name.as_bytes()),
            hyper::header::HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push(Cookie::new(name.into(), value.into()));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn cookies(&self) -> &[Cookie<'static>] {
        &self.cookies
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Where a request goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyTarget {
    /// Application that serves the request
    pub application: String,
    /// Application whose rule matched, when a different one serves it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_application: Option<String>,
    pub protocol: Protocol,
    pub host: String,
    pub port: u16,
    /// Path and query to send upstream, control parameters removed
    pub path: String,
    /// `protocol://authority` followed by `path`
    pub url: String,
    /// Served by a locally running development server
    pub is_local: bool,
    /// Explicit flag value from the request, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag_value: Option<bool>,
}

impl ProxyTarget {
    pub fn is_secure(&self) -> bool {
        self.protocol == Protocol::Https
    }

    /// Upstream origin without the path.
    pub fn origin(&self) -> String {
        Host::new(self.protocol, self.host.clone(), Some(self.port)).url()
    }
}

/// Outcome of path-group matching.
enum PathMatch<'a> {
    Matched(&'a Application),
    /// A flag-gated group matched without an explicit flag value
    Deferred(&'a Application),
    Unmatched,
}

/// Resolves requests against one routing configuration.
#[derive(Debug, Clone)]
pub struct ProxyRequestRouter {
    config: Arc<MicrofrontendsConfig>,
    local_apps: HashSet<String>,
}

impl ProxyRequestRouter {
    /// `local_apps` names (or package aliases) of applications running locally.
    pub fn new<I, S>(config: Arc<MicrofrontendsConfig>, local_apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let local_apps: HashSet<String> = local_apps.into_iter().map(Into::into).collect();
        for name in &local_apps {
            if config.find_application(name).is_none() {
                crate::warn_fmt!(
                    "Router",
                    "Local application \"{}\" is not in the configuration and will be ignored",
                    name
                );
            }
        }
        Self { config, local_apps }
    }

    pub fn config(&self) -> &MicrofrontendsConfig {
        &self.config
    }

    /// Whether `application` runs locally, by name or alias.
    pub fn is_local(&self, application: &Application) -> bool {
        self.local_apps.contains(application.name())
            || application
                .package_name()
                .is_some_and(|alias| self.local_apps.contains(alias))
    }

    /// Resolve a request to its upstream target.
    pub fn resolve(&self, request: &RouteRequest) -> ProxyTarget {
        let (query, query_flag) = take_flag_value(request.query());
        let flag_value = query_flag.or_else(|| request.header(FLAG_VALUE_HEADER).and_then(parse_bool));
        let upstream_path = match &query {
            Some(query) => format!("{}?{}", request.path(), query),
            None => request.path().to_string(),
        };
        let path = request.path();

        if builtin::is_auth_path(path, query.as_deref()) {
            return self.auth_target(query.as_deref(), upstream_path, flag_value);
        }

        let view = self.view_for(request);
        let config: &MicrofrontendsConfig = &view;

        let target = if let Some(app) = self.platform_application(config, request, path, query.as_deref(), flag_value) {
            self.target_for(config, app, None, upstream_path, flag_value)
        } else if let Some(app) = self.zone_application(config, request) {
            self.target_for(config, app, None, upstream_path, flag_value)
        } else {
            match self.match_path(config, path, flag_value) {
                PathMatch::Matched(app) => self.target_for(config, app, None, upstream_path, flag_value),
                PathMatch::Deferred(app) => self.target_for(
                    config,
                    config.default_application(),
                    Some(app.name()),
                    upstream_path,
                    flag_value,
                ),
                PathMatch::Unmatched => {
                    self.target_for(config, config.default_application(), None, upstream_path, flag_value)
                }
            }
        };

        crate::debug_fmt!(
            "Router",
            "{} -> {} ({}{})",
            request.path(),
            target.application,
            target.url,
            if target.is_local { ", local" } else { "" }
        );
        target
    }

    /// Target of `application` for `path`, ignoring request state.
    pub fn target_for_application(&self, application: &Application, path: &str) -> ProxyTarget {
        self.target_for(&self.config, application, None, path.to_string(), None)
    }

    /// Configuration with the request's override cookies applied.
    fn view_for<'a>(&'a self, request: &RouteRequest) -> Cow<'a, MicrofrontendsConfig> {
        if self.config.options().disable_overrides
            || !request.cookies().iter().any(|c| is_override_cookie(c.name()))
        {
            return Cow::Borrowed(&self.config);
        }

        let overrides = OverridesConfig::parse(request.cookies());
        if overrides.is_empty() {
            Cow::Borrowed(&self.config)
        } else {
            Cow::Owned(self.config.with_overrides(&overrides))
        }
    }

    fn auth_target(&self, query: Option<&str>, path: String, flag_value: Option<bool>) -> ProxyTarget {
        let default = self.config.default_application();
        let fallback = default
            .fallback_host()
            .map(|host| host.host.clone())
            .unwrap_or_default();
        let host = query_param(query, builtin::HOST_OVERRIDE_QUERY_PARAM)
            .and_then(|value| Host::parse(&value, Protocol::Https).ok())
            .map(|host| host.host)
            .unwrap_or(fallback);

        let origin = Host::new(Protocol::Https, host.clone(), Some(443));
        ProxyTarget {
            application: default.name().to_string(),
            original_application: None,
            protocol: Protocol::Https,
            host,
            port: 443,
            url: format!("{}{}", origin.url(), path),
            path,
            is_local: false,
            flag_value,
        }
    }

    /// Step 3: paths owned by an application regardless of its routing.
    fn platform_application<'a>(
        &self,
        config: &'a MicrofrontendsConfig,
        request: &RouteRequest,
        path: &str,
        query: Option<&str>,
        flag_value: Option<bool>,
    ) -> Option<&'a Application> {
        if let Some(app) = asset_prefix_application(config.applications(), path) {
            return Some(app);
        }

        match builtin::classify(path, query)? {
            PlatformPath::Overlay => {
                let page = referer_path(request.header(REFERER.as_str())?)?;
                Some(self.application_for_path(config, &page, flag_value))
            }
            PlatformPath::SourceMap => config
                .applications()
                .iter()
                .map(Arc::as_ref)
                .find(|app| self.is_local(app)),
            PlatformPath::Image { source } => {
                Some(self.application_for_path(config, &source, flag_value))
            }
        }
    }

    /// Path-only resolution used for re-routing on behalf of another
    /// request. Never consults platform paths, so it cannot recurse.
    fn application_for_path<'a>(
        &self,
        config: &'a MicrofrontendsConfig,
        path: &str,
        flag_value: Option<bool>,
    ) -> &'a Application {
        if let Some(app) = asset_prefix_application(config.applications(), path) {
            return app;
        }
        match self.match_path(config, path, flag_value) {
            PathMatch::Matched(app) => app,
            PathMatch::Deferred(_) | PathMatch::Unmatched => config.default_application(),
        }
    }

    /// Step 4: explicit zone header.
    fn zone_application<'a>(
        &self,
        config: &'a MicrofrontendsConfig,
        request: &RouteRequest,
    ) -> Option<&'a Application> {
        let zone = request.headers().get(ZONE_HEADER)?;
        let name = match zone.to_str() {
            Ok(name) if !name.trim().is_empty() => name.trim(),
            _ => {
                crate::error_fmt!("Router", "Ignoring malformed {} header", ZONE_HEADER);
                return None;
            }
        };

        match config.find_application(name) {
            Some(app) => Some(app.as_ref()),
            None => {
                crate::error_fmt!(
                    "Router",
                    "{} names unknown application \"{}\"; falling back to path routing",
                    ZONE_HEADER,
                    name
                );
                None
            }
        }
    }

    /// Step 5: path groups in declaration order.
    fn match_path<'a>(
        &self,
        config: &'a MicrofrontendsConfig,
        path: &str,
        flag_value: Option<bool>,
    ) -> PathMatch<'a> {
        for app in config.child_applications() {
            for group in app.routing() {
                if !group.matches(path) {
                    continue;
                }
                let Some(flag) = &group.flag else {
                    return PathMatch::Matched(app);
                };
                match flag_value {
                    Some(true) => return PathMatch::Matched(app),
                    Some(false) => continue,
                    None => {
                        let default = config.default_application();
                        if !self.is_local(default) {
                            crate::warn_fmt!(
                                "Router",
                                "\"{}\" is gated by flag \"{}\" of \"{}\"; deferring to \"{}\" which is not running locally, so the flag cannot be evaluated",
                                path,
                                flag,
                                app.name(),
                                default.name()
                            );
                        }
                        return PathMatch::Deferred(app);
                    }
                }
            }
        }
        PathMatch::Unmatched
    }

    /// Target for `application`: override, then local, then fallback, then
    /// the default application's fallback.
    fn target_for(
        &self,
        config: &MicrofrontendsConfig,
        application: &Application,
        matched: Option<&str>,
        path: String,
        flag_value: Option<bool>,
    ) -> ProxyTarget {
        let mut served_by = application;
        let mut original_application = matched.map(str::to_string);
        let mut is_local = false;

        let host = if let Some(host) = application.environment_override_host() {
            host
        } else if self.is_local(application) {
            is_local = true;
            application.development_local_host()
        } else if let Some(host) = application.fallback_host() {
            host
        } else {
            let default = config.default_application();
            if original_application.is_none() {
                original_application = Some(application.name().to_string());
            }
            served_by = default;
            if let Some(host) = default.environment_override_host() {
                host
            } else if self.is_local(default) {
                is_local = true;
                default.development_local_host()
            } else {
                default
                    .fallback_host()
                    .unwrap_or_else(|| default.development_local_host())
            }
        };

        ProxyTarget {
            application: served_by.name().to_string(),
            original_application,
            protocol: host.protocol,
            host: host.host.clone(),
            port: host.effective_port(),
            url: format!("{}{}", host.url(), path),
            path,
            is_local,
            flag_value,
        }
    }
}

/// Application whose asset prefix is the first segment of `path`.
fn asset_prefix_application<'a>(applications: &'a [Arc<Application>], path: &str) -> Option<&'a Application> {
    let segment = first_segment(path)?;
    applications
        .iter()
        .find(|app| app.asset_prefixes().iter().any(|prefix| prefix == segment))
        .map(Arc::as_ref)
}

/// Remove the flag parameter from a raw query, returning its value.
///
/// Other parameters are kept byte for byte.
fn take_flag_value(query: Option<&str>) -> (Option<String>, Option<bool>) {
    let Some(query) = query else {
        return (None, None);
    };

    let mut flag = None;
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let is_flag = form_urlencoded::parse(key.as_bytes())
                .next()
                .is_some_and(|(k, _)| k == FLAG_VALUE_QUERY_PARAM);
            if is_flag {
                flag = flag.or_else(|| parse_bool(value));
            }
            !is_flag && !pair.is_empty()
        })
        .collect();

    let query = (!kept.is_empty()).then(|| kept.join("&"));
    (query, flag)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}
