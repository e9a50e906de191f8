// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raw configuration sources.
//!
//! The proxy is configured from an ordered list of [`ConfigProvider`]s;
//! later providers override earlier ones. The usual stack is:
//!
//! 1. `FileConfigProvider` reading `microfrontends.{json,jsonc,toml,yaml}`
//! 2. `EnvConfigProvider` reading `MFE_*` variables
//! 3. *your* provider implementing [`ConfigProvider`]
//!
//! | key            | type            | description                                   |
//! |----------------|-----------------|-----------------------------------------------|
//! | `applications` | *object*        | Routing document applications                 |
//! | `options`      | *object*        | Routing document options                      |
//! | `config`       | *string/object* | Whole serialized routing document (env only)  |
//! | `port`         | `u16`           | Local proxy port                              |
//! | `host`         | `string`        | Bind address, defaults to `localhost`         |
//! | `local.apps`   | *list*          | Applications running locally                  |
//! | `log.level`    | `string`        | `error` .. `trace`                            |
//! | `log.format`   | `string`        | `terminal` or `json`                          |
//! | `log.structured` | `bool`        | Route `log` records through slog              |

mod env;
pub mod error;
mod file;
mod jsonc;


pub use env::{DEFAULT_ENV_PREFIX, EnvConfigProvider};
pub use error::ConfigError;
pub use file::{FileConfigProvider, FileFormat};
pub use jsonc::strip_json_comments;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// Keys the proxy reads. Environment variables map onto them by dropping
/// the prefix and turning `_` into `.` (`MFE_LOCAL_APPS` -> `local.apps`).
pub mod keys {
    pub const SCHEMA: &str = "$schema";
    pub const APPLICATIONS: &str = "applications";
    pub const OPTIONS: &str = "options";
    /// Serialized routing document, optionally with overrides.
    pub const CONFIG: &str = "config";
    /// Path of the routing document; read by the binary.
    pub const CONFIG_FILE: &str = "config.file";
    pub const PORT: &str = "port";
    pub const HOST: &str = "host";
    pub const LOCAL_APPS: &str = "local.apps";
    pub const LOG_LEVEL: &str = "log.level";
    pub const LOG_FORMAT: &str = "log.format";
    pub const LOG_STRUCTURED: &str = "log.structured";

    /// Every key above.
    pub const ALL: &[&str] = &[
        SCHEMA,
        APPLICATIONS,
        OPTIONS,
        CONFIG,
        CONFIG_FILE,
        PORT,
        HOST,
        LOCAL_APPS,
        LOG_LEVEL,
        LOG_FORMAT,
        LOG_STRUCTURED,
    ];
}

/// A source of raw configuration values.
///
/// Object safe so a [`Config`] can stack different sources; typed access
/// lives in [`ConfigProviderExt`].
pub trait ConfigProvider: Debug + Send + Sync {
    fn has(&self, key: &str) -> bool;

    /// Short name used in diagnostics (`file`, `env`, ...).
    fn provider_name(&self) -> &str;

    fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError>;
}

/// Typed reads for any [`ConfigProvider`].
pub trait ConfigProviderExt: ConfigProvider {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get_raw(key)?.map(|value| deserialize(key, value)).transpose()
    }
}

impl<T: ConfigProvider> ConfigProviderExt for T {}

fn deserialize<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, ConfigError> {
    serde_json::from_value(value)
        .map_err(|e| ConfigError::ParseError(format!("failed to deserialize '{key}': {e}")))
}

/// Collects providers, lowest priority first.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider; it wins over every provider added before it.
    pub fn with_provider<P: ConfigProvider + 'static>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Add a provider that is already shared.
    pub fn with_shared_provider(mut self, provider: Arc<dyn ConfigProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn build(self) -> Config {
        Config {
            providers: self.providers,
        }
    }
}

/// Layered configuration: a key is answered by the last provider that has it.
#[derive(Debug, Clone)]
pub struct Config {
    providers: Vec<Arc<dyn ConfigProvider>>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Provider answering `key`.
    fn provider_for(&self, key: &str) -> Option<&dyn ConfigProvider> {
        self.providers
            .iter()
            .rev()
            .find(|provider| provider.has(key))
            .map(|provider| provider.as_ref())
    }

    pub fn get_raw(&self, key: &str) -> Result<Option<Value>, ConfigError> {
        match self.provider_for(key) {
            Some(provider) => provider.get_raw(key),
            None => Ok(None),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        self.get_raw(key)?.map(|value| deserialize(key, value)).transpose()
    }

    pub fn get_or_default<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        Ok(self.get(key)?.unwrap_or(default))
    }

    pub fn has(&self, key: &str) -> bool {
        self.provider_for(key).is_some()
    }

    /// Name of the provider `key` is read from, for startup diagnostics.
    pub fn source_of(&self, key: &str) -> Option<&str> {
        self.provider_for(key).map(|provider| provider.provider_name())
    }

    /// Names of the providers, lowest priority first.
    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.provider_name()).collect()
    }
}
