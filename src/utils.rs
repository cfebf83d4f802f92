use std::time::{Duration, Instant};

/// Format a `Duration` as a human-readable string with automatic unit scaling.
///
/// Produces output like `1.94ms`, `2.34s`, `150.00µs` using Rust's Debug format.
pub fn fmt_duration(d: Duration) -> String {
    format!("{d:.2?}")
}

/// Log a warning if the elapsed time since `start` exceeds `threshold`.
pub fn log_if_slow(start: Instant, threshold: Duration, label: &str) {
    let elapsed = start.elapsed();
    if elapsed > threshold {
        tracing::warn!(duration = fmt_duration(elapsed), "slow operation: {label}");
    }
}

/// Whole hours left until `remaining` elapses, rounded up.
///
/// A partially elapsed hour still counts as one, so anything above zero
/// reports at least `1`.
pub fn ceil_hours(remaining: chrono::Duration) -> i64 {
    const HOUR_MS: i64 = 60 * 60 * 1000;
    let ms = remaining.num_milliseconds();
    if ms <= 0 {
        return 0;
    }
    (ms + HOUR_MS - 1) / HOUR_MS
}
