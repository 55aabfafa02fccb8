// SPDX-License-Identifier: MIT

//! Commit intensity: a bounded 0-100 activity score.
//!
//! Derived on demand from a time-windowed slice of a user's commit log;
//! never persisted. Window and saturation are parameters so the public
//! 20-minute signal and the stricter 5-minute per-user helper share one
//! implementation.

use crate::models::CommitRecord;
use chrono::{DateTime, Duration, Utc};

/// Window for the public "recent activity" signal.
pub const DEFAULT_WINDOW_MINUTES: i64 = 20;
/// Window for the stricter per-user helper.
pub const STRICT_WINDOW_MINUTES: i64 = 5;
/// Commits in the window that count as 100% intensity.
pub const DEFAULT_SATURATION_COUNT: u32 = 5;

/// Count commits with `timestamp >= now - window_minutes`.
pub fn commits_in_window(
    commits: &[CommitRecord],
    now: DateTime<Utc>,
    window_minutes: i64,
) -> usize {
    let cutoff = now - Duration::minutes(window_minutes);
    commits.iter().filter(|c| c.timestamp >= cutoff).count()
}

/// Intensity score in `[0, 100]`.
///
/// `min(100, count_in_window / saturation_count * 100)`; deterministic
/// for a given `now`.
pub fn intensity(
    commits: &[CommitRecord],
    now: DateTime<Utc>,
    window_minutes: i64,
    saturation_count: u32,
) -> f64 {
    let count = commits_in_window(commits, now, window_minutes);
    let saturation = saturation_count.max(1);
    ((count as f64 / saturation as f64) * 100.0).min(100.0)
}
