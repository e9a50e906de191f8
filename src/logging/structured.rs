// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Structured logging backed by slog.

use slog::{Drain, Logger, o};
use slog_async::Async;
use slog_json::Json;
use slog_term::{FullFormat, TermDecorator};
use std::io;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Structured logging format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable terminal output
    Terminal,
    /// One JSON object per line on stdout
    Json,
}

/// Structured logger configuration
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LogFormat,
    pub level: slog::Level,
    pub include_location: bool,
    /// Key-value pairs attached to every record
    pub static_fields: Vec<(String, String)>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Terminal,
            level: slog::Level::Info,
            include_location: true,
            static_fields: Vec::new(),
        }
    }
}

/// Create a structured logger with the given configuration
pub fn create_logger(config: &LoggerConfig) -> Logger {
    let logger = match config.format {
        LogFormat::Terminal => {
            let decorator = TermDecorator::new().build();
            let mut format = FullFormat::new(decorator);
            if config.include_location {
                format = format.use_file_location();
            }
            let drain = format.build().fuse().filter_level(config.level).fuse();
            Logger::root(Async::new(drain).build().fuse(), o!("service" => "mfe-proxy"))
        }
        LogFormat::Json => {
            let drain = Json::new(io::stdout())
                .add_default_keys()
                .build()
                .fuse()
                .filter_level(config.level)
                .fuse();
            Logger::root(Async::new(drain).build().fuse(), o!("service" => "mfe-proxy"))
        }
    };

    config
        .static_fields
        .iter()
        .fold(logger, |logger, (key, value)| {
            // slog keys are 'static; static fields are set once per process
            let key: &'static str = Box::leak(key.clone().into_boxed_str());
            logger.new(o!(key => value.clone()))
        })
}

/// Generate a new trace ID
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Per-request data carried through the access log.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub trace_id: String,
    pub method: String,
    /// Path and query as received
    pub path: String,
    pub remote_addr: String,
    pub user_agent: String,
    pub started: Instant,
}

impl RequestInfo {
    pub fn new(method: String, path: String, remote_addr: String, user_agent: String) -> Self {
        Self {
            trace_id: generate_trace_id(),
            method,
            path,
            remote_addr,
            user_agent,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Keeps the global slog logger installed while alive.
pub struct LoggerGuard {
    _guard: slog_scope::GlobalLoggerGuard,
}

/// Initialize the global structured logger
pub fn init_global_logger(config: &LoggerConfig) -> LoggerGuard {
    let logger = create_logger(config);
    LoggerGuard {
        _guard: slog_scope::set_global_logger(logger),
    }
}
