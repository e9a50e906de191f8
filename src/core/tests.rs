// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[cfg(test)]
mod core_tests {
    use std::net::{SocketAddr, TcpListener};
    use std::sync::Arc;

    use http_body_util::BodyExt;
    use hyper::header::{COOKIE, HOST, HeaderValue, LOCATION, SET_COOKIE};
    use hyper::{HeaderMap, Request, StatusCode};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::core::auth::BypassSecrets;
    use crate::core::{
        ProxyCore, ProxyError, UpstreamTiming, rewrite_location, strip_hop_by_hop, strip_proxy_cookies,
    };
    use crate::router::{ProxyRequestRouter, ProxyTarget, RouteRequest};
    use crate::routing::{MicrofrontendsConfig, Protocol};

    fn config(docs_local: &str) -> String {
        format!(
            r#"{{
                "applications": {{
                    "web": {{ "development": {{ "fallback": "web.example.com" }} }},
                    "docs": {{
                        "development": {{ "local": "{docs_local}", "fallback": "docs.example.com" }},
                        "routing": [ {{ "paths": ["/docs", "/docs/:path*"] }} ]
                    }}
                }}
            }}"#
        )
    }

    fn core(docs_local: &str, local_apps: &[&str]) -> ProxyCore {
        let config = Arc::new(MicrofrontendsConfig::from_json_str(&config(docs_local)).unwrap());
        let router = Arc::new(ProxyRequestRouter::new(config, local_apps.iter().copied()));
        ProxyCore::new(router, "http://localhost:3024/").unwrap()
    }

    fn request(uri: &str) -> Request<reqwest::Body> {
        Request::builder()
            .uri(uri)
            .header(HOST, "localhost:3024")
            .body(reqwest::Body::from(""))
            .unwrap()
    }

    fn resolve(core: &ProxyCore, req: &Request<reqwest::Body>) -> ProxyTarget {
        core.router().resolve(&RouteRequest::from_parts(req.uri(), req.headers()))
    }

    fn deployed_target() -> ProxyTarget {
        ProxyTarget {
            application: "docs".to_string(),
            original_application: None,
            protocol: Protocol::Https,
            host: "docs.example.com".to_string(),
            port: 443,
            path: "/docs".to_string(),
            url: "https://docs.example.com/docs".to_string(),
            is_local: false,
            flag_value: None,
        }
    }

    fn client_addr() -> Option<SocketAddr> {
        Some("10.0.0.7:51000".parse().unwrap())
    }

    #[tokio::test]
    async fn test_forward_to_local_application() {
        let upstream = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/docs/guide"))
            .and(query_param("tab", "api"))
            .and(header("x-vercel-mfe-local-proxy-origin", "1"))
            .and(header("x-vercel-mfe-flag-value", "true"))
            .and(header("x-forwarded-host", "localhost:3024"))
            .respond_with(ResponseTemplate::new(200).set_body_string("docs page"))
            .expect(1)
            .mount(&upstream)
            .await;

        let core = core(&upstream.uri(), &["docs"]);
        let req = request("/docs/guide?tab=api&vercel-mfe-flag-value=true");
        let target = resolve(&core, &req);
        assert!(target.is_local);
        assert_eq!(target.flag_value, Some(true));

        let resp = core.forward(req, &target, client_addr()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.extensions().get::<UpstreamTiming>().is_some());
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"docs page");
    }

    #[tokio::test]
    async fn test_forward_passes_redirects_through() {
        let upstream = MockServer::start().await;
        Mock::given(path("/docs"))
            .respond_with(
                ResponseTemplate::new(307)
                    .insert_header("location", "/docs/intro")
                    .insert_header("x-served-by", "docs"),
            )
            .mount(&upstream)
            .await;

        let core = core(&upstream.uri(), &["docs"]);
        let req = request("/docs");
        let target = resolve(&core, &req);

        let resp = core.forward(req, &target, None).await.unwrap();
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(resp.headers()[LOCATION], "/docs/intro");
        assert_eq!(resp.headers()["x-served-by"], "docs");
    }

    #[tokio::test]
    async fn test_forward_streams_request_body() {
        let upstream = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/docs/search"))
            .respond_with(|req: &wiremock::Request| {
                ResponseTemplate::new(200).set_body_bytes(req.body.clone())
            })
            .mount(&upstream)
            .await;

        let core = core(&upstream.uri(), &["docs"]);
        let req = Request::builder()
            .method("POST")
            .uri("/docs/search")
            .body(reqwest::Body::from("query=routing"))
            .unwrap();
        let target = resolve(&core, &req);

        let resp = core.forward(req, &target, None).await.unwrap();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"query=routing");
    }

    #[tokio::test]
    async fn test_unreachable_upstream_names_target() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let core = core(&format!("http://127.0.0.1:{port}"), &["docs"]);
        let req = request("/docs");
        let target = resolve(&core, &req);

        match core.forward(req, &target, None).await {
            Err(err @ ProxyError::Upstream { .. }) => {
                let message = err.to_string();
                assert!(message.starts_with("error proxying request to docs at 127.0.0.1:"));
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[test]
    fn test_deployed_headers() {
        let core = core("3100", &[]).with_bypass_secrets({
            let mut secrets = BypassSecrets::default();
            secrets.insert("docs", "s3cret");
            secrets
        });

        let mut incoming = HeaderMap::new();
        incoming.insert(HOST, HeaderValue::from_static("localhost:3024"));
        incoming.insert(
            COOKIE,
            HeaderValue::from_static(
                "session=abc; vercel-micro-frontends-override:env:docs=http%3A%2F%2Flocalhost%3A3100; VERCEL_MFE_DEBUG=1; theme=dark",
            ),
        );

        let headers = core.upstream_headers(&incoming, &deployed_target(), client_addr(), false);
        assert_eq!(headers[HOST], "docs.example.com");
        assert_eq!(headers[COOKIE], "session=abc; theme=dark");
        assert_eq!(headers["x-vercel-protection-bypass"], "s3cret");
        assert_eq!(headers["x-vercel-mfe-local-proxy-origin"], "1");
        assert!(headers.get("x-forwarded-for").is_none());
    }

    #[test]
    fn test_deployed_upgrade_tagged_as_proxy_origin() {
        let core = core("3100", &[]);
        let mut incoming = HeaderMap::new();
        incoming.insert("connection", HeaderValue::from_static("Upgrade"));
        incoming.insert("upgrade", HeaderValue::from_static("websocket"));

        let headers = core.upstream_headers(&incoming, &deployed_target(), None, true);
        assert_eq!(headers["x-vercel-mfe-local-proxy-origin"], "1");
        assert_eq!(headers["upgrade"], "websocket");
    }

    #[test]
    fn test_deployed_host_keeps_non_default_port() {
        let core = core("3100", &[]);
        let mut target = deployed_target();
        target.host = "staging.example.com".to_string();
        target.port = 8443;

        let headers = core.upstream_headers(&HeaderMap::new(), &target, None, false);
        assert_eq!(headers[HOST], "staging.example.com:8443");
    }

    #[test]
    fn test_local_headers() {
        let core = core("3100", &["docs"]);
        let mut target = deployed_target();
        target.protocol = Protocol::Http;
        target.host = "localhost".to_string();
        target.flag_value = Some(false);

        let mut incoming = HeaderMap::new();
        incoming.insert(HOST, HeaderValue::from_static("localhost:3024"));
        incoming.insert("x-forwarded-for", HeaderValue::from_static("192.168.1.2"));
        incoming.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        incoming.insert(COOKIE, HeaderValue::from_static("VERCEL_MFE_DEBUG=1"));

        let headers = core.upstream_headers(&incoming, &target, client_addr(), false);
        assert_eq!(headers[HOST], "localhost:3024");
        assert_eq!(headers["x-vercel-mfe-local-proxy-origin"], "1");
        assert_eq!(headers["x-vercel-mfe-flag-value"], "false");
        assert_eq!(headers["x-forwarded-for"], "192.168.1.2, 10.0.0.7");
        assert_eq!(headers["x-forwarded-proto"], "http");
        assert!(headers.get("keep-alive").is_none());
        // cookies reach local servers untouched
        assert_eq!(headers[COOKIE], "VERCEL_MFE_DEBUG=1");
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("Upgrade, x-internal"));
        headers.insert("upgrade", HeaderValue::from_static("websocket"));
        headers.insert("x-internal", HeaderValue::from_static("1"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));

        let mut upgrade = headers.clone();
        strip_hop_by_hop(&mut upgrade, true);
        assert!(upgrade.get("connection").is_some());
        assert!(upgrade.get("upgrade").is_some());
        assert!(upgrade.get("x-internal").is_none());
        assert!(upgrade.get("transfer-encoding").is_none());

        strip_hop_by_hop(&mut headers, false);
        assert!(headers.is_empty());
    }

    #[test]
    fn test_strip_proxy_cookies_drops_empty_header() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("VERCEL_MFE_DEBUG=1"));
        strip_proxy_cookies(&mut headers);
        assert!(headers.get(COOKIE).is_none());
    }

    #[test]
    fn test_rewrite_location() {
        let target = deployed_target();
        let origin = "http://localhost:3024";

        assert_eq!(
            rewrite_location("https://docs.example.com/docs/next?a=1#top", &target, origin).as_deref(),
            Some("http://localhost:3024/docs/next?a=1#top")
        );
        assert_eq!(rewrite_location("https://vercel.com/login", &target, origin), None);
        assert_eq!(rewrite_location("/docs/next", &target, origin), None);
    }

    #[test]
    fn test_adapt_secure_headers() {
        let core = core("3100", &[]);
        let mut headers = HeaderMap::new();
        headers.insert(LOCATION, HeaderValue::from_static("https://docs.example.com/docs/"));
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("session=abc; Domain=docs.example.com; Path=/; Secure"),
        );
        headers.append(SET_COOKIE, HeaderValue::from_static("plain=1; Path=/"));

        core.adapt_secure_headers(&deployed_target(), &mut headers);
        assert_eq!(headers[LOCATION], "http://localhost:3024/docs/");

        let cookies: Vec<&str> = headers
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("session=abc"));
        assert!(!cookies[0].contains("Domain"));
        assert_eq!(cookies[1], "plain=1; Path=/");
    }

    #[test]
    fn test_sso_challenge_page() {
        let core = core("3100", &[]);
        let mut headers = HeaderMap::new();
        headers.insert(SET_COOKIE, HeaderValue::from_static("_vercel_sso_nonce=abc; Path=/"));
        let target = deployed_target();
        let return_to = "http://localhost:3024/docs";

        let page = core
            .sso_page(StatusCode::UNAUTHORIZED, &headers, &target, return_to)
            .unwrap();
        assert!(page.contains("nonce=abc"));

        assert!(core.sso_page(StatusCode::OK, &headers, &target, return_to).is_none());
        assert!(
            core.sso_page(StatusCode::UNAUTHORIZED, &HeaderMap::new(), &target, return_to)
                .is_none()
        );
    }
}
