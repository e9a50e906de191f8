// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use once_cell::sync::OnceCell;
use slog::{Discard, Logger, o};
use slog_scope::GlobalLoggerGuard;

/// Install a discarding global slog logger for the test binary.
///
/// Structured code paths call `slog_scope::logger()`, which panics without a
/// global logger once the guard is dropped; tests call this first.
pub fn init_test_logger() {
    static GUARD: OnceCell<GlobalLoggerGuard> = OnceCell::new();

    GUARD.get_or_init(|| slog_scope::set_global_logger(Logger::root(Discard, o!())));
}
