use once_cell::sync::OnceCell;
use slog::{Discard, Logger, o};
use slog_scope::GlobalLoggerGuard;

static GUARD: OnceCell<GlobalLoggerGuard> = OnceCell::new();

/// Install a process-wide discarding slog logger for tests.
///
/// Tests that drive the structured code paths call this first so
/// `slog_scope::logger()` has something to hand out. Repeat calls are no-ops.
pub fn init_test_logger() {
    GUARD.get_or_init(|| slog_scope::set_global_logger(Logger::root(Discard, o!())));
}
