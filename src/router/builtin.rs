// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Paths with platform meaning: deployment auth and framework internals.

use url::form_urlencoded;

/// Deployment protection redirect target.
pub const AUTH_REDIRECT_PATH: &str = "/.well-known/vercel-auth-redirect";
/// Single sign-on API prefix.
pub const SSO_PATH_PREFIX: &str = "/sso-api";
/// Query parameter carrying a deployment JWT.
pub const JWT_QUERY_PARAM: &str = "_vercel_jwt";
/// Query parameter naming the host an auth request must go to.
pub const HOST_OVERRIDE_QUERY_PARAM: &str = "_host_override";

pub const IMAGE_OPTIMIZATION_PATH: &str = "/_next/image";
pub const SOURCE_MAP_PATH: &str = "/__nextjs_source-map";

const OVERLAY_PATHS: [&str; 3] = [
    "/__nextjs_original-stack-frame",
    "/__nextjs_original-stack-frames",
    "/__nextjs_launch-editor",
];

/// Framework path classes that are routed by something other than their path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformPath {
    /// Error overlay request; routed by the page that rendered the error
    Overlay,
    /// Source map; no reliable owner
    SourceMap,
    /// Image optimization; routed by the decoded image path
    Image { source: String },
}

/// Decoded value of the first `name` query parameter.
pub fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    let query = query?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Whether the request must escape to the deployed default application.
pub fn is_auth_path(path: &str, query: Option<&str>) -> bool {
    path == AUTH_REDIRECT_PATH
        || path == SSO_PATH_PREFIX
        || path.starts_with(&format!("{SSO_PATH_PREFIX}/"))
        || query_param(query, JWT_QUERY_PARAM).is_some()
}

/// First path segment, without slashes.
pub fn first_segment(path: &str) -> Option<&str> {
    path.trim_start_matches('/')
        .split('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

/// Classify framework internals. Asset-prefix paths are checked separately
/// because they depend on the configured applications.
pub fn classify(path: &str, query: Option<&str>) -> Option<PlatformPath> {
    if OVERLAY_PATHS.contains(&path) {
        return Some(PlatformPath::Overlay);
    }
    if path == SOURCE_MAP_PATH || path.ends_with(".map") {
        return Some(PlatformPath::SourceMap);
    }
    if path == IMAGE_OPTIMIZATION_PATH {
        // only same-site images can be attributed to an application
        return query_param(query, "url")
            .filter(|source| source.starts_with('/') && !source.starts_with("//"))
            .map(|source| PlatformPath::Image {
                source: strip_query(&source).to_string(),
            });
    }
    None
}

/// Path component of a `Referer` value.
pub fn referer_path(referer: &str) -> Option<String> {
    if referer.starts_with('/') {
        return Some(strip_query(referer).to_string());
    }
    url::Url::parse(referer).ok().map(|url| url.path().to_string())
}

/// `path` without its query string or fragment.
pub fn strip_query(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_paths() {
        assert!(is_auth_path("/.well-known/vercel-auth-redirect", None));
        assert!(is_auth_path("/sso-api", None));
        assert!(is_auth_path("/sso-api/callback", Some("a=1")));
        assert!(is_auth_path("/docs", Some("_vercel_jwt=abc")));
        assert!(!is_auth_path("/sso-apis", None));
        assert!(!is_auth_path("/docs", Some("jwt=abc")));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("/__nextjs_launch-editor", None), Some(PlatformPath::Overlay));
        assert_eq!(classify("/__nextjs_source-map", None), Some(PlatformPath::SourceMap));
        assert_eq!(classify("/_next/static/chunk.js.map", None), Some(PlatformPath::SourceMap));
        assert_eq!(
            classify("/_next/image", Some("url=%2Fdocs%2Fphoto.png%3Fv%3D2&w=64")),
            Some(PlatformPath::Image {
                source: "/docs/photo.png".to_string()
            })
        );
        assert_eq!(classify("/_next/image", Some("url=https%3A%2F%2Fcdn.example.com%2Fa.png")), None);
        assert_eq!(classify("/docs", None), None);
    }

    #[test]
    fn test_referer_path() {
        assert_eq!(
            referer_path("http://localhost:3024/docs/guide?x=1").as_deref(),
            Some("/docs/guide")
        );
        assert_eq!(referer_path("/blog#top").as_deref(), Some("/blog"));
        assert_eq!(referer_path("not a url"), None);
    }

    #[test]
    fn test_first_segment() {
        assert_eq!(first_segment("/vc-ap-abc123/_next/x.js"), Some("vc-ap-abc123"));
        assert_eq!(first_segment("/"), None);
    }
}
