// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Context-tagged logging macros.
//!
//! Everything routes through the standard `log` facade; when structured
//! logging is on, the `slog-stdlog` bridge (installed by
//! [`crate::logging::init_with_config`]) carries these lines into `slog`,
//! so callers never need to know which sink is active.

/// Shared expansion for the leveled `*_fmt!` macros.
#[doc(hidden)]
#[macro_export]
macro_rules! __context_log {
    ($level:ident, $context:expr, $($arg:tt)+) => {
        log::$level!("[{}] {}", $context, format_args!($($arg)+))
    };
}

/// Log an error tagged with its source context.
#[macro_export]
macro_rules! error_fmt {
    ($context:expr, $($arg:tt)+) => {
        $crate::__context_log!(error, $context, $($arg)+)
    };
}

/// Log a warning tagged with its source context.
#[macro_export]
macro_rules! warn_fmt {
    ($context:expr, $($arg:tt)+) => {
        $crate::__context_log!(warn, $context, $($arg)+)
    };
}

/// Log an info line tagged with its source context.
#[macro_export]
macro_rules! info_fmt {
    ($context:expr, $($arg:tt)+) => {
        $crate::__context_log!(info, $context, $($arg)+)
    };
}

/// Log a debug line tagged with its source context.
#[macro_export]
macro_rules! debug_fmt {
    ($context:expr, $($arg:tt)+) => {
        $crate::__context_log!(debug, $context, $($arg)+)
    };
}

/// Log a trace line tagged with its source context.
#[macro_export]
macro_rules! trace_fmt {
    ($context:expr, $($arg:tt)+) => {
        $crate::__context_log!(trace, $context, $($arg)+)
    };
}
