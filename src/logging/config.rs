// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `proxy.logging` section and its translation to the slog backend.

use crate::logging::structured::{LogFormat, LoggerConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Logging configuration, read from the `proxy.logging` section.
///
/// Everything defaults to the plain `env_logger` sink; setting `structured`
/// switches to the slog pipeline, with `format` choosing its output shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Route log records through the structured (slog) pipeline
    #[serde(default)]
    pub structured: bool,

    /// Structured output shape, `terminal` or `json`
    #[serde(default = "terminal_format")]
    pub format: String,

    /// Minimum level for the structured pipeline
    #[serde(default = "info_level")]
    pub level: String,

    /// Record the source location of each log call
    #[serde(default = "enabled")]
    pub include_location: bool,

    /// Record the emitting thread's ID
    #[serde(default = "enabled")]
    pub include_thread_id: bool,

    /// Stamp the trace ID onto outgoing responses
    #[serde(default = "enabled")]
    pub include_trace_id: bool,

    /// Reuse a trace ID supplied by the caller instead of generating one
    #[serde(default = "enabled")]
    pub propagate_trace_id: bool,

    /// Header carrying the trace ID, inbound and outbound
    #[serde(default = "trace_header")]
    pub trace_id_header: String,

    /// Key-value pairs attached to every structured record
    #[serde(default)]
    pub static_fields: HashMap<String, String>,
}

fn enabled() -> bool {
    true
}

fn terminal_format() -> String {
    "terminal".to_string()
}

fn info_level() -> String {
    "info".to_string()
}

fn trace_header() -> String {
    "X-Trace-ID".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        // Mirrors the serde defaults, so a missing section and an empty
        // section come out the same.
        Self {
            structured: false,
            format: terminal_format(),
            level: info_level(),
            include_location: enabled(),
            include_thread_id: enabled(),
            include_trace_id: enabled(),
            propagate_trace_id: enabled(),
            trace_id_header: trace_header(),
            static_fields: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Translate into the structured backend's own config type.
    ///
    /// Unrecognized `format`/`level` strings fall back to terminal output at
    /// info level rather than failing startup.
    pub fn to_logger_config(&self) -> LoggerConfig {
        let format = if self.format.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Terminal
        };
        LoggerConfig {
            format,
            level: slog_level(&self.level),
            include_location: self.include_location,
            include_thread_id: self.include_thread_id,
            static_fields: self.static_fields.clone(),
        }
    }
}

fn slog_level(level: &str) -> slog::Level {
    match level.to_lowercase().as_str() {
        "trace" => slog::Level::Trace,
        "debug" => slog::Level::Debug,
        "info" => slog::Level::Info,
        "warn" => slog::Level::Warning,
        "error" => slog::Level::Error,
        "critical" => slog::Level::Critical,
        _ => slog::Level::Info,
    }
}
