//! ---
//! ate_section: "01-core-functionality"
//! ate_subsection: "module"
//! ate_type: "source"
//! ate_scope: "code"
//! ate_description: "Shared primitives and utilities for the bench runtime."
//! ate_version: "v0.0.0-prealpha"
//! ate_owner: "tbd"
//! ---
use std::time::Duration;

use tokio::time::Instant;

/// Capture a monotonic instant suitable for debounce comparisons.
///
/// Goes through the tokio clock so paused-time tests exercise the same
/// arithmetic as production.
pub fn monotonic_now() -> Instant {
    Instant::now()
}

/// Milliseconds elapsed since `earlier`, saturating at `u64::MAX`.
pub fn elapsed_ms(earlier: Instant) -> u64 {
    duration_to_millis(earlier.elapsed())
}

/// Convert a duration into whole milliseconds, saturating at `u64::MAX`.
pub fn duration_to_millis(duration: Duration) -> u64 {
    duration
        .as_secs()
        .saturating_mul(1_000)
        .saturating_add(u64::from(duration.subsec_millis()))
}
