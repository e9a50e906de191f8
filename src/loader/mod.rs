// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level entry-point – "turn the key and go".
//!
//! The [`MicrofrontendsLoader`] consumes raw configuration, builds and
//! validates the routing model, and returns a [`LocalProxy`] whose server is
//! ready to start.
//!
//! The routing document comes from, in order of preference:
//!
//! 1. [`MicrofrontendsLoader::with_document`]
//! 2. the `config` key, a whole serialized document (usually `MFE_CONFIG`)
//! 3. the `applications` / `options` keys of the layered configuration


use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{
    Config, ConfigBuilder, ConfigError, ConfigProvider, EnvConfigProvider, FileConfigProvider, keys,
    strip_json_comments,
};
use crate::core::{ProxyCore, ProxyError};
use crate::logging::{self, AccessLog, LoggingConfig};
use crate::router::ProxyRequestRouter;
use crate::routing::{ConfigDocument, MicrofrontendsConfig, RoutingConfigError, SerializedConfig};
use crate::server::{LocalProxyServer, ServerConfig};

/// Errors that can occur during proxy initialization.
#[derive(Error, Debug)]
pub enum LoaderError {
    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// The routing document is invalid
    #[error(transparent)]
    RoutingError(#[from] RoutingConfigError),

    /// Proxy error
    #[error("proxy error: {0}")]
    ProxyError(#[from] ProxyError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Builder for a [`LocalProxy`].
#[derive(Debug, Default)]
pub struct MicrofrontendsLoader {
    config: Option<Config>,
    config_file_path: Option<String>,
    use_env_vars: bool,
    env_prefix: Option<String>,
    providers: Vec<Arc<dyn ConfigProvider>>,
    document: Option<SerializedConfig>,
    local_apps: Option<Vec<String>>,
    port: Option<u16>,
}

impl MicrofrontendsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a ready-made configuration instead of assembling providers.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Read the routing document and settings from a file.
    pub fn with_config_file(mut self, file_path: &str) -> Self {
        self.config_file_path = Some(file_path.to_string());
        self
    }

    /// Enable environment variable configuration.
    pub fn with_env_vars(mut self) -> Self {
        self.use_env_vars = true;
        self
    }

    /// Set a custom prefix for environment variables (default is "MFE_").
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.use_env_vars = true;
        self
    }

    /// Add a configuration provider; it wins over files and the environment.
    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Use this routing document regardless of configuration.
    pub fn with_document(mut self, document: ConfigDocument) -> Self {
        self.document = Some(SerializedConfig {
            config: document,
            overrides: None,
        });
        self
    }

    /// Use a serialized configuration, overrides included.
    pub fn with_serialized(mut self, serialized: SerializedConfig) -> Self {
        self.document = Some(serialized);
        self
    }

    /// Applications running locally, by name or package name.
    pub fn with_local_apps<I, S>(mut self, apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.local_apps = Some(apps.into_iter().map(Into::into).collect());
        self
    }

    /// Port for the proxy; wins over every configured value.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Build and initialize the proxy.
    pub fn build(self) -> Result<LocalProxy, LoaderError> {
        let config = match self.config {
            Some(config) => config,
            None => {
                let mut builder = ConfigBuilder::new();

                if let Some(file_path) = &self.config_file_path {
                    builder = builder.with_provider(FileConfigProvider::new(file_path)?);
                }

                if self.use_env_vars {
                    let env_provider = match &self.env_prefix {
                        Some(prefix) => EnvConfigProvider::new(prefix),
                        None => EnvConfigProvider::default(),
                    };
                    builder = builder.with_provider(env_provider);
                }

                for provider in self.providers {
                    builder = builder.with_shared_provider(provider);
                }
                builder.build()
            }
        };
        let config = Arc::new(config);

        let logging_config = LoggingConfig::from_config(&config)?;
        logging::init_with_config(&logging_config);
        crate::info_fmt!("Startup", "Microfrontends proxy starting up");

        let serialized = match self.document {
            Some(serialized) => serialized,
            None => routing_document(&config)?,
        };
        let routing = Arc::new(MicrofrontendsConfig::from_serialized(serialized)?);

        let local_apps = match self.local_apps {
            Some(apps) => apps,
            None => local_apps(&config)?,
        };

        let port = match self.port {
            Some(port) => port,
            None => match config.get::<u16>(keys::PORT)? {
                Some(port) => {
                    crate::debug_fmt!(
                        "Loader",
                        "Port {} from {} configuration",
                        port,
                        config.source_of(keys::PORT).unwrap_or("unknown")
                    );
                    port
                }
                None => routing.local_proxy_port(),
            },
        };
        let host: String = config.get_or_default(keys::HOST, ServerConfig::default().host)?;

        let router = Arc::new(ProxyRequestRouter::new(routing.clone(), local_apps));
        let core = ProxyCore::new(router, proxy_origin(&host, port))?;
        let server = LocalProxyServer::new(ServerConfig { host, port }, Arc::new(core))
            .with_access_log(AccessLog::new(logging_config));

        Ok(LocalProxy {
            config,
            routing,
            server,
        })
    }
}

/// The assembled proxy: configuration, routing model and server.
#[derive(Debug, Clone)]
pub struct LocalProxy {
    config: Arc<Config>,
    routing: Arc<MicrofrontendsConfig>,
    server: LocalProxyServer,
}

impl LocalProxy {
    /// Create a new loader.
    pub fn loader() -> MicrofrontendsLoader {
        MicrofrontendsLoader::new()
    }

    /// Get the raw configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn routing(&self) -> &MicrofrontendsConfig {
        &self.routing
    }

    pub fn server(&self) -> &LocalProxyServer {
        &self.server
    }

    /// Start the proxy server.
    pub async fn start(&self) -> Result<(), LoaderError> {
        self.server.start().await.map_err(LoaderError::ProxyError)
    }
}

/// Routing document from the `config` key or the document keys.
fn routing_document(config: &Config) -> Result<SerializedConfig, LoaderError> {
    if let Some(value) = config.get_raw(keys::CONFIG)? {
        let value = match value {
            Value::String(text) => serde_json::from_str(&strip_json_comments(&text))
                .map_err(|e| RoutingConfigError::Parse(format!("config: {e}")))?,
            other => other,
        };
        return serialized_from_value(value);
    }

    let Some(applications) = config.get_raw(keys::APPLICATIONS)? else {
        return Err(LoaderError::Other(
            "no routing configuration found: provide a configuration file with \"applications\" or set the \"config\" key".to_string(),
        ));
    };

    let mut document = Map::new();
    if let Some(schema) = config.get_raw(keys::SCHEMA)? {
        document.insert(keys::SCHEMA.to_string(), schema);
    }
    document.insert(keys::APPLICATIONS.to_string(), applications);
    if let Some(options) = config.get_raw(keys::OPTIONS)? {
        document.insert(keys::OPTIONS.to_string(), options);
    }
    serialized_from_value(Value::Object(document))
}

/// Accept both a bare document and the `{config, overrides}` serialized form.
fn serialized_from_value(value: Value) -> Result<SerializedConfig, LoaderError> {
    let is_serialized = value.get("config").is_some() && value.get("applications").is_none();
    let serialized = if is_serialized {
        serde_json::from_value(value)
    } else {
        serde_json::from_value::<ConfigDocument>(value).map(|config| SerializedConfig {
            config,
            overrides: None,
        })
    };
    serialized.map_err(|e| LoaderError::RoutingError(RoutingConfigError::Parse(e.to_string())))
}

/// `local.apps` as a list, or a comma separated string.
fn local_apps(config: &Config) -> Result<Vec<String>, LoaderError> {
    let apps = match config.get_raw(keys::LOCAL_APPS)? {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(list)) => list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(name) => Some(name),
                _ => None,
            })
            .collect(),
        Some(other) => {
            return Err(LoaderError::ConfigError(ConfigError::ParseError(format!(
                "local.apps must be a list or a comma separated string, got {other}"
            ))));
        }
    };
    Ok(apps)
}

/// Origin browsers use to reach a proxy bound to `host`.
fn proxy_origin(host: &str, port: u16) -> String {
    let host = match host {
        "0.0.0.0" | "::" | "[::]" | "127.0.0.1" | "::1" | "[::1]" => "localhost",
        other => other,
    };
    format!("http://{host}:{port}")
}
