// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logging setup.
//!
//! Everything logs through the `log` facade, usually via the `*_fmt!`
//! macros which prefix a component name. By default records go to
//! `env_logger`; with structured logging enabled they are bridged into a
//! global `slog` logger (terminal or JSON) by `slog-stdlog`.

pub mod config;
pub mod middleware;
pub mod structured;
mod wrapper;

#[cfg(test)]
pub mod test_logger;

pub use config::LoggingConfig;
pub use middleware::AccessLog;

use log::LevelFilter;
use once_cell::sync::OnceCell;
use std::sync::Once;

static INIT: Once = Once::new();
static STRUCTURED_GUARD: OnceCell<structured::LoggerGuard> = OnceCell::new();

/// Initialize `env_logger` with the specified level.
///
/// `RUST_LOG` wins over `level`. Only the first call has an effect.
pub fn init(level: Option<LevelFilter>) {
    INIT.call_once(|| {
        let fallback = level.unwrap_or(LevelFilter::Info).to_string().to_lowercase();
        let env = env_logger::Env::default().filter_or("RUST_LOG", fallback);

        // a logger may already be installed by an embedding application
        let _ = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .format_target(false)
            .try_init();

        log::debug!("Logging initialized at level: {}", log::max_level());
    });
}

/// Initialize logging from a [`LoggingConfig`].
///
/// Structured configurations install a global slog logger and bridge the
/// `log` facade into it; everything else falls back to [`init`].
pub fn init_with_config(config: &LoggingConfig) {
    let level = config.level_filter();

    if !config.structured {
        init(Some(level));
        return;
    }

    INIT.call_once(|| {
        let guard = structured::init_global_logger(&config.to_logger_config());
        match slog_stdlog::init_with_level(level.to_level().unwrap_or(log::Level::Error)) {
            Ok(()) => {
                log::set_max_level(level);
                let _ = STRUCTURED_GUARD.set(guard);
            }
            Err(e) => {
                // keep whatever logger won the race
                eprintln!("failed to install structured logger: {e}");
            }
        }
    });
}
