// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logging utilities for Periscope.
//!
//! Two sinks are supported, selected by [`LoggingConfig::structured`]: plain
//! `env_logger` output, or a structured `slog` pipeline (terminal or JSON)
//! with the standard `log` facade bridged into it via `slog-stdlog`.  The
//! `log_*` helpers stamp a context label either way, so call sites never
//! care which sink is active.

pub mod access;
pub mod config;
pub mod structured;
mod wrapper;

#[cfg(test)]
pub(crate) mod test_logger;

use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{LevelFilter, debug, error, info, trace, warn};

pub use config::LoggingConfig;

static INIT: Once = Once::new();

/// Set once the slog pipeline owns the global logger.
pub(crate) static USING_STRUCTURED: AtomicBool = AtomicBool::new(false);

/// Whether the structured (slog) pipeline is active.
pub fn is_structured_logging() -> bool {
    USING_STRUCTURED.load(Ordering::SeqCst)
}

/// Initialize plain logging at `level`.
///
/// Shorthand for [`init_with_config`] with no logging section.
pub fn init(level: Option<LevelFilter>) {
    init_with_config(level, None);
}

/// Initialize logging, choosing the sink from the optional [`LoggingConfig`].
///
/// Only the first call has any effect; later calls are ignored.
pub fn init_with_config(level: Option<LevelFilter>, config: Option<LoggingConfig>) {
    INIT.call_once(|| {
        let config = config.unwrap_or_default();

        if config.structured {
            let guard = structured::init_global_logger(&config.to_logger_config());
            // The guard must live for the rest of the process; dropping it
            // would uninstall the global logger.
            std::mem::forget(guard);

            let bridge_level = level
                .and_then(|l| l.to_level())
                .unwrap_or(log::Level::Info);

            match slog_stdlog::init_with_level(bridge_level) {
                Ok(()) => USING_STRUCTURED.store(true, Ordering::SeqCst),
                Err(e) => error!("Failed to bridge the log facade into slog: {}", e),
            }
        } else {
            let env = env_logger::Env::default().filter_or(
                "RUST_LOG",
                level.map_or("info", |l| match l {
                    LevelFilter::Trace => "trace",
                    LevelFilter::Debug => "debug",
                    LevelFilter::Info => "info",
                    LevelFilter::Warn => "warn",
                    LevelFilter::Error => "error",
                    LevelFilter::Off => "off",
                }),
            );

            env_logger::Builder::from_env(env)
                .format_timestamp_millis()
                .format_target(true)
                .init();
        }

        info!("Logging ready, level {}", log::max_level());
    });
}

/// Log an error under a context label, handing the error back.
///
/// Designed to sit inside `map_err` without breaking the chain.
pub fn log_error<E: std::fmt::Display>(context: &str, err: E) -> E {
    if is_structured_logging() {
        let logger = slog_scope::logger();
        slog::error!(logger, "{}", err; "context" => context);
    } else {
        error!("{}: {}", context, err);
    }
    err
}

/// Log a warning under a context label.
pub fn log_warning<E: std::fmt::Display>(context: &str, err: E) {
    if is_structured_logging() {
        let logger = slog_scope::logger();
        slog::warn!(logger, "{}", err; "context" => context);
    } else {
        warn!("{}: {}", context, err);
    }
}

/// Log a debug message under a context label.
pub fn log_debug<M: std::fmt::Display>(context: &str, msg: M) {
    if is_structured_logging() {
        let logger = slog_scope::logger();
        slog::debug!(logger, "{}", msg; "context" => context);
    } else {
        debug!("{}: {}", context, msg);
    }
}

/// Log a trace message under a context label.
pub fn log_trace<M: std::fmt::Display>(context: &str, msg: M) {
    if is_structured_logging() {
        let logger = slog_scope::logger();
        slog::trace!(logger, "{}", msg; "context" => context);
    } else {
        trace!("{}: {}", context, msg);
    }
}

/// Log an info message under a context label.
pub fn log_info<M: std::fmt::Display>(context: &str, msg: M) {
    if is_structured_logging() {
        let logger = slog_scope::logger();
        slog::info!(logger, "{}", msg; "context" => context);
    } else {
        info!("{}: {}", context, msg);
    }
}

/// Log a message with additional key-value fields.
///
/// In structured mode the fields become slog key-value pairs; otherwise
/// they are rendered inline after the message.
pub fn log_with_context(
    level: log::Level,
    message: &str,
    context: &str,
    fields: &[(&'static str, String)],
) {
    if is_structured_logging() {
        let logger = add_fields_to_logger(slog_scope::logger(), fields);
        match level {
            log::Level::Error => slog::error!(logger, "{}", message; "context" => context),
            log::Level::Warn => slog::warn!(logger, "{}", message; "context" => context),
            log::Level::Info => slog::info!(logger, "{}", message; "context" => context),
            log::Level::Debug => slog::debug!(logger, "{}", message; "context" => context),
            log::Level::Trace => slog::trace!(logger, "{}", message; "context" => context),
        }
    } else {
        let rendered = fields
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(" ");

        if rendered.is_empty() {
            log::log!(level, "{}: {}", context, message);
        } else {
            log::log!(level, "{}: {} [{}]", context, message, rendered);
        }
    }
}

/// Build a child logger carrying the given fields.
fn add_fields_to_logger(
    mut logger: slog::Logger,
    fields: &[(&'static str, String)],
) -> slog::Logger {
    for (key, value) in fields {
        logger = logger.new(slog::o!(*key => value.clone()));
    }
    logger
}
