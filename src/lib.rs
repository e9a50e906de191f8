// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Microfrontends - path-based routing for sites composed of several
//! independently deployed applications, and the local development proxy that
//! uses it.
//!
//! One routing document lists the applications. Exactly one of them is the
//! default and serves every path nobody else claims; the others claim path
//! groups written in a small pattern language (`/docs/:path*`). The document
//! is validated once, up front, and then answers "which application serves
//! this request, and where is it running?".
//!
//! # Layers
//!
//! - [`pattern`]: path grammar, matching and overlap detection
//! - [`routing`]: the validated, immutable configuration model
//! - [`overrides`]: per-request host overrides carried in cookies
//! - [`router`]: request -> [`ProxyTarget`] resolution
//! - [`core`] and [`server`]: the local proxy that forwards traffic
//! - [`loader`]: configuration sources -> ready-to-start proxy
//!
//! # Routing without the proxy
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use microfrontends::{MicrofrontendsConfig, ProxyRequestRouter, RouteRequest};
//!
//! let config = MicrofrontendsConfig::from_json_str(r#"{
//!     "applications": {
//!         "web":  { "development": { "fallback": "web.example.com" } },
//!         "docs": { "routing": [ { "paths": ["/docs/:path*"] } ] }
//!     }
//! }"#).unwrap();
//!
//! let router = ProxyRequestRouter::new(Arc::new(config), ["docs"]);
//! let target = router.resolve(&RouteRequest::new("/docs/intro"));
//! assert_eq!(target.application, "docs");
//! assert!(target.is_local);
//! ```
//!
//! # Running the proxy
//!
//! ```rust,no_run
//! use microfrontends::LocalProxy;
//!
//! # async fn run() -> Result<(), microfrontends::LoaderError> {
//! let proxy = LocalProxy::loader()
//!     .with_config_file("microfrontends.json")
//!     .with_env_vars()
//!     .with_local_apps(["docs"])
//!     .build()?;
//! proxy.start().await
//! # }
//! ```

// Module declarations
pub mod config;
pub mod core;
pub mod loader;
pub mod logging;
pub mod overrides;
pub mod pattern;
pub mod router;
pub mod routing;
pub mod server;

// Re-export key types at the crate root for convenience
pub use config::{Config, ConfigError, ConfigProvider, ConfigProviderExt};
pub use core::{ProxyCore, ProxyError, UpstreamTiming};
pub use loader::{LoaderError, LocalProxy, MicrofrontendsLoader};
pub use overrides::OverridesConfig;
pub use router::{FlagEvaluator, ProxyRequestRouter, ProxyTarget, RouteRequest};
pub use routing::{
    Application, ClientConfig, ClientRouter, ConfigDocument, Host, MicrofrontendsConfig, Protocol,
    RoutingConfigError,
};
pub use server::{LocalProxyServer, ServerConfig};
