// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration for logging.

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{Config, ConfigError, keys};
use crate::logging::structured::{LogFormat, LoggerConfig};

/// Logging configuration, read from the `log.*` keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Route records through slog instead of env_logger
    #[serde(default)]
    pub structured: bool,

    /// `terminal` or `json`
    #[serde(default = "default_format")]
    pub format: String,

    #[serde(default = "default_level")]
    pub level: String,

    /// Include source location (terminal format only)
    #[serde(default = "default_true")]
    pub include_location: bool,

    /// Reuse a trace id sent by the client
    #[serde(default = "default_true")]
    pub propagate_trace_id: bool,

    /// Header carrying the trace id, both ways
    #[serde(default = "default_trace_header")]
    pub trace_id_header: String,

    /// Static fields attached to every structured record
    #[serde(default)]
    pub static_fields: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_format() -> String {
    "terminal".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

fn default_trace_header() -> String {
    "x-trace-id".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            structured: false,
            format: default_format(),
            level: default_level(),
            include_location: true,
            propagate_trace_id: true,
            trace_id_header: default_trace_header(),
            static_fields: BTreeMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Read `log.level`, `log.format` and `log.structured`, keeping
    /// defaults for anything unset.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut logging = match config.get::<LoggingConfig>("log")? {
            Some(logging) => logging,
            None => Self::default(),
        };

        if let Some(level) = config.get::<String>(keys::LOG_LEVEL)? {
            logging.level = level;
        }
        if let Some(format) = config.get::<String>(keys::LOG_FORMAT)? {
            logging.format = format;
        }
        if let Some(structured) = config.get::<bool>(keys::LOG_STRUCTURED)? {
            logging.structured = structured;
        }

        Ok(logging)
    }

    /// `level` as a `log` filter; unknown names mean `info`.
    pub fn level_filter(&self) -> LevelFilter {
        match self.level.to_lowercase().as_str() {
            "off" => LevelFilter::Off,
            "trace" => LevelFilter::Trace,
            "debug" => LevelFilter::Debug,
            "warn" | "warning" => LevelFilter::Warn,
            "error" => LevelFilter::Error,
            _ => LevelFilter::Info,
        }
    }

    /// Convert to logger config
    pub fn to_logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            format: match self.format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Terminal,
            },
            level: match self.level_filter() {
                LevelFilter::Trace => slog::Level::Trace,
                LevelFilter::Debug => slog::Level::Debug,
                LevelFilter::Warn => slog::Level::Warning,
                LevelFilter::Error | LevelFilter::Off => slog::Level::Error,
                LevelFilter::Info => slog::Level::Info,
            },
            include_location: self.include_location,
            static_fields: self
                .static_fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}
