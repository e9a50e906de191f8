// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Access logging with trace context.

use hyper::header::{HeaderName, HeaderValue, USER_AGENT};
use hyper::{Request, Response, StatusCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::logging::config::LoggingConfig;
use crate::logging::structured::{RequestInfo, generate_trace_id};

/// Logs every proxied request and tags the response with its trace id.
#[derive(Debug, Clone)]
pub struct AccessLog {
    config: Arc<LoggingConfig>,
    trace_header: HeaderName,
}

impl Default for AccessLog {
    fn default() -> Self {
        Self::new(LoggingConfig::default())
    }
}

impl AccessLog {
    pub fn new(config: LoggingConfig) -> Self {
        let trace_header = HeaderName::from_bytes(config.trace_id_header.as_bytes())
            .unwrap_or_else(|_| HeaderName::from_static("x-trace-id"));
        Self {
            config: Arc::new(config),
            trace_header,
        }
    }

    pub fn config(&self) -> &LoggingConfig {
        &self.config
    }

    /// Capture request details and log the arrival.
    pub fn begin<B>(&self, req: &Request<B>, remote_addr: Option<SocketAddr>) -> RequestInfo {
        let trace_id = if self.config.propagate_trace_id {
            req.headers()
                .get(&self.trace_header)
                .and_then(|h| h.to_str().ok())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(generate_trace_id)
        } else {
            generate_trace_id()
        };

        let info = RequestInfo {
            trace_id,
            method: req.method().to_string(),
            path: req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| req.uri().path().to_string()),
            remote_addr: remote_addr
                .map(|addr| addr.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            user_agent: req
                .headers()
                .get(USER_AGENT)
                .and_then(|h| h.to_str().ok())
                .unwrap_or("unknown")
                .to_string(),
            started: std::time::Instant::now(),
        };

        if self.config.structured {
            slog::debug!(slog_scope::logger(), "Request received";
                "trace_id" => &info.trace_id,
                "method" => &info.method,
                "path" => &info.path,
                "remote_addr" => &info.remote_addr,
                "user_agent" => &info.user_agent
            );
        } else {
            crate::debug_fmt!(
                "Access",
                "{} {} from {} (trace_id: {})",
                info.method,
                info.path,
                info.remote_addr,
                info.trace_id
            );
        }

        info
    }

    /// Log the outcome of a request.
    ///
    /// `application` is the resolved target, `None` for requests the proxy
    /// answered itself.
    pub fn finish(
        &self,
        info: &RequestInfo,
        status: StatusCode,
        application: Option<&str>,
        upstream: Option<Duration>,
    ) {
        let elapsed_ms = info.elapsed().as_millis();
        let upstream_ms = upstream.map(|d| d.as_millis()).unwrap_or(0);
        let application = application.unwrap_or("-");

        if self.config.structured {
            slog::info!(slog_scope::logger(), "Request completed";
                "trace_id" => &info.trace_id,
                "method" => &info.method,
                "path" => &info.path,
                "application" => application,
                "status" => status.as_u16(),
                "elapsed_ms" => elapsed_ms as u64,
                "upstream_ms" => upstream_ms as u64
            );
        } else {
            crate::info_fmt!(
                "Access",
                "{} {} -> {} {} | total={}ms upstream={}ms (trace_id: {})",
                info.method,
                info.path,
                application,
                status.as_u16(),
                elapsed_ms,
                upstream_ms,
                info.trace_id
            );
        }
    }

    /// Echo the trace id back to the client.
    pub fn tag_response<B>(&self, response: &mut Response<B>, info: &RequestInfo) {
        if let Ok(value) = HeaderValue::from_str(&info.trace_id) {
            response.headers_mut().insert(self.trace_header.clone(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Empty;
    use hyper::Method;

    fn request(trace_id: Option<&str>) -> Request<Empty<Bytes>> {
        let mut builder = Request::builder()
            .method(Method::GET)
            .uri("/docs/guide?x=1")
            .header("user-agent", "test-agent/1.0");
        if let Some(trace_id) = trace_id {
            builder = builder.header("x-trace-id", trace_id);
        }
        builder.body(Empty::<Bytes>::new()).unwrap()
    }

    #[test]
    fn test_begin_captures_request() {
        let log = AccessLog::default();
        let addr: SocketAddr = "192.168.1.100:8080".parse().unwrap();
        let info = log.begin(&request(None), Some(addr));

        assert_eq!(info.method, "GET");
        assert_eq!(info.path, "/docs/guide?x=1");
        assert_eq!(info.remote_addr, "192.168.1.100:8080");
        assert_eq!(info.user_agent, "test-agent/1.0");
        assert_eq!(info.trace_id.len(), 36);
    }

    #[test]
    fn test_trace_id_propagation() {
        let log = AccessLog::default();
        assert_eq!(log.begin(&request(Some("abc-123")), None).trace_id, "abc-123");

        let log = AccessLog::new(LoggingConfig {
            propagate_trace_id: false,
            ..LoggingConfig::default()
        });
        assert_ne!(log.begin(&request(Some("abc-123")), None).trace_id, "abc-123");
    }

    #[test]
    fn test_tag_response() {
        let log = AccessLog::default();
        let info = log.begin(&request(Some("abc-123")), None);
        let mut response = Response::new(Empty::<Bytes>::new());
        log.tag_response(&mut response, &info);
        log.finish(&info, StatusCode::OK, Some("docs"), None);
        assert_eq!(response.headers()["x-trace-id"], "abc-123");
    }

    #[test]
    fn test_invalid_trace_header_falls_back() {
        let log = AccessLog::new(LoggingConfig {
            trace_id_header: "bad header".to_string(),
            ..LoggingConfig::default()
        });
        assert_eq!(log.trace_header.as_str(), "x-trace-id");
    }
}
