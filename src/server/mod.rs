// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Local development proxy server.
//!
//! A thin wrapper around **hyper-util**: it owns the listening socket, turns
//! each request into a routing decision and hands it to [`ProxyCore`].
//!
//! `hyper_util::server::conn::auto::Builder` serves HTTP/1.1 and HTTP/2 on
//! the same connection, with upgrades enabled so WebSocket traffic (dev
//! server hot reload) can be tunnelled.
//!
//! Per request, in order:
//!
//! 1. paths with repeated slashes get a `308` to the collapsed path
//! 2. the routing and client-config endpoints are answered directly
//! 3. the router resolves a target
//! 4. the request is tunnelled (WebSocket) or forwarded; failures become a
//!    `500` naming the target

pub mod info;


use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::TryStreamExt;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::{RwLock, oneshot};
use tokio::task::{Id, JoinSet};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use crate::core::{ProxyCore, ProxyError, UpstreamTiming, is_websocket_upgrade};
use crate::logging::AccessLog;
use crate::router::RouteRequest;
use crate::routing::DEFAULT_LOCAL_PROXY_PORT;
use info::{CLIENT_CONFIG_PATH, ROUTING_INFO_PATH};

/// How long in-flight connections may take to finish after shutdown.
const DRAIN_TIMEOUT: tokio::time::Duration = tokio::time::Duration::from_secs(30);

/// Configuration for the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_LOCAL_PROXY_PORT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// The local proxy: accepts browser traffic and forwards it per the router.
#[derive(Debug, Clone)]
pub struct LocalProxyServer {
    config: ServerConfig,
    core: Arc<ProxyCore>,
    access_log: AccessLog,
    /// Shutdown senders for each connection task
    shutdown_senders: Arc<RwLock<HashMap<Id, oneshot::Sender<()>>>>,
}

impl LocalProxyServer {
    pub fn new(config: ServerConfig, core: Arc<ProxyCore>) -> Self {
        Self {
            config,
            core,
            access_log: AccessLog::default(),
            shutdown_senders: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_access_log(mut self, access_log: AccessLog) -> Self {
        self.access_log = access_log;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn core(&self) -> &ProxyCore {
        &self.core
    }

    /// Bind the configured address.
    pub async fn bind(&self) -> Result<TcpListener, ProxyError> {
        TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| {
                ProxyError::Other(format!(
                    "Failed to bind {}:{}: {}",
                    self.config.host, self.config.port, e
                ))
            })
    }

    /// Bind, print where every application is served from, and serve until
    /// Ctrl-C or SIGTERM.
    pub async fn start(&self) -> Result<(), ProxyError> {
        let listener = self.bind().await?;
        let addr = listener.local_addr()?;

        for line in info::startup_summary(self.core.router(), addr.port()) {
            info!("{}", line);
        }

        self.serve(listener, shutdown_signal()?).await
    }

    /// Serve `listener` until `shutdown` resolves, then drain connections.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<(), ProxyError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut join_set = JoinSet::new();

        if let Ok(addr) = listener.local_addr() {
            info!("Microfrontends proxy listening on http://{}", addr);
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested; no longer accepting connections");
                    break;
                }
                accept = listener.accept() => {
                    match accept {
                        Ok((stream, remote_addr)) => {
                            let core = self.core.clone();
                            let access_log = self.access_log.clone();
                            let (tx, rx) = oneshot::channel::<()>();
                            let shutdown_senders = self.shutdown_senders.clone();

                            let handle = join_set.spawn(async move {
                                let task_id = tokio::task::id();

                                let service = service_fn(move |req: Request<Incoming>| {
                                    debug!("Incoming over {:?}", req.version());
                                    handle_request(req, core.clone(), access_log.clone(), Some(remote_addr))
                                });
                                let io = TokioIo::new(stream);
                                let builder = AutoBuilder::new(TokioExecutor::new());
                                let connection = builder.serve_connection_with_upgrades(io, service);
                                let mut conn = std::pin::pin!(connection);

                                tokio::select! {
                                    res = &mut conn => log_connection_end(res, "Connection closed normally"),
                                    _ = rx => {
                                        debug!("Connection received shutdown signal, waiting for graceful close");
                                        conn.as_mut().graceful_shutdown();
                                        log_connection_end(conn.await, "Connection closed gracefully after shutdown signal");
                                    }
                                }

                                shutdown_senders.write().await.remove(&task_id);
                                debug!("Connection task {:?} completed", task_id);
                            });

                            self.shutdown_senders.write().await.insert(handle.id(), tx);
                        }
                        Err(e) => error!("Accept error: {}", e),
                    }
                }
            }
        }

        {
            let mut senders = self.shutdown_senders.write().await;
            info!("Signaling {} connection(s) to shut down", senders.len());
            for (task_id, sender) in senders.drain() {
                debug!("Sending shutdown signal to task {:?}", task_id);
                let _ = sender.send(());
            }
        }

        let start_time = tokio::time::Instant::now();
        let drain = async {
            let total = join_set.len();
            let mut completed = 0;
            while let Some(res) = join_set.join_next().await {
                completed += 1;
                match res {
                    Ok(()) => debug!("Connection task completed ({}/{})", completed, total),
                    Err(e) if e.is_cancelled() => debug!("Connection task cancelled ({}/{})", completed, total),
                    Err(e) => error!("Connection task failed ({}/{}): {}", completed, total, e),
                }
            }
        };

        match tokio::time::timeout(DRAIN_TIMEOUT, drain).await {
            Ok(()) => info!(
                "All connections drained gracefully in {:.1}s",
                start_time.elapsed().as_secs_f32()
            ),
            Err(_) => {
                warn!(
                    "Shutdown timed out after {} seconds, some connections may be forcefully closed",
                    DRAIN_TIMEOUT.as_secs()
                );
                join_set.shutdown().await;
            }
        }

        info!("Shutdown complete");
        Ok(())
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
fn shutdown_signal() -> Result<impl Future<Output = ()>, ProxyError> {
    #[cfg(unix)]
    let mut term_stream = signal(SignalKind::terminate())
        .map_err(|e| ProxyError::Other(format!("Cannot install SIGTERM handler: {}", e)))?;

    Ok(async move {
        #[cfg(unix)]
        let sigterm = async move {
            term_stream.recv().await;
        };
        #[cfg(not(unix))]
        let sigterm = std::future::pending::<()>();

        tokio::select! {
            _ = signal::ctrl_c() => info!("Received Ctrl-C; initiating graceful shutdown"),
            _ = sigterm => info!("Received SIGTERM; initiating graceful shutdown"),
        }
    })
}

fn log_connection_end(res: Result<(), Box<dyn std::error::Error + Send + Sync>>, closed: &str) {
    match res {
        Ok(()) => debug!("{}", closed),
        Err(e) => {
            let err_str = e.to_string();
            if !err_str.contains("connection closed") && !err_str.contains("connection reset") {
                error!("Connection error: {}", e);
            }
        }
    }
}

/// Handle one request end to end, logging it and tagging the response.
pub(crate) async fn handle_request<B>(
    req: Request<B>,
    core: Arc<ProxyCore>,
    access_log: AccessLog,
    remote_addr: Option<SocketAddr>,
) -> Result<Response<reqwest::Body>, Infallible>
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let info = access_log.begin(&req, remote_addr);
    let (mut response, application) = dispatch(req, &core, remote_addr).await;

    let upstream = response.extensions().get::<UpstreamTiming>().map(|timing| timing.0);
    access_log.finish(&info, response.status(), application.as_deref(), upstream);
    access_log.tag_response(&mut response, &info);
    Ok(response)
}

async fn dispatch<B>(
    req: Request<B>,
    core: &ProxyCore,
    remote_addr: Option<SocketAddr>,
) -> (Response<reqwest::Body>, Option<String>)
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    if let Some(location) = info::collapse_slashes(req.uri()) {
        crate::debug_fmt!("Server", "Normalizing {} -> {}", req.uri(), location);
        return (info::normalize_redirect(&location, req.headers()), None);
    }

    if req.method() == Method::GET {
        match req.uri().path() {
            ROUTING_INFO_PATH => return (info::json_response(&info::routing_info(core.router())), None),
            CLIENT_CONFIG_PATH => return (info::json_response(&info::client_config(core.router())), None),
            _ => {}
        }
    }

    let target = core
        .router()
        .resolve(&RouteRequest::from_parts(req.uri(), req.headers()));
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let result = if is_websocket_upgrade(req.headers()) {
        crate::debug_fmt!("Server", "Tunnelling WebSocket {} to {}", path, target.application);
        core.forward_websocket(req, &target, remote_addr).await
    } else {
        // Incoming → Stream → reqwest::Body
        let (parts, body) = req.into_parts();
        let body = reqwest::Body::wrap_stream(body.into_data_stream().map_ok(Bytes::from));
        core.forward(Request::from_parts(parts, body), &target, remote_addr).await
    };

    let response = result.unwrap_or_else(|e| {
        crate::error_fmt!("Server", "{} {}: {}", method, path, e);
        let message = match e {
            ProxyError::Upstream { .. } => e.to_string(),
            _ => "Internal Server Error".to_string(),
        };
        info::text_response(StatusCode::INTERNAL_SERVER_ERROR, message)
    });

    (response, Some(target.application))
}
