// SPDX-License-Identifier: MIT

//! Read-only projections over the user collection.
//!
//! All three projections are pure functions over a snapshot of users so
//! the ordering and consistency properties are testable without a
//! database. The handlers in `routes::api` fetch the snapshot and call
//! into here. Staleness up to the front end's polling interval is fine.

use crate::models::User;
use crate::time_utils::format_utc_rfc3339;
use serde::Serialize;
use std::collections::HashSet;

/// Observed front-end default for the leaderboard.
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 7;
/// Observed front-end default for the commit feed.
pub const DEFAULT_RECENT_COMMITS_LIMIT: usize = 5;

/// One leaderboard row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub username: String,
    pub total_commits: u32,
    pub avatar_url: Option<String>,
}

/// One entry in the cross-user commit feed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentCommit {
    pub id: String,
    pub message: String,
    pub author: String,
    pub repo: String,
    /// RFC3339 commit timestamp
    pub time: String,
    pub avatar_url: Option<String>,
}

/// Dashboard-wide totals.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStats {
    pub total_commits: usize,
    pub total_projects: usize,
    pub total_hackers: usize,
}

/// Users with at least one commit, by `total_commits` descending, top
/// `limit`. Tie order follows the snapshot.
pub fn leaderboard(users: &[User], limit: usize) -> Vec<LeaderboardEntry> {
    let mut ranked: Vec<&User> = users.iter().filter(|u| !u.commits.is_empty()).collect();
    ranked.sort_by(|a, b| b.total_commits.cmp(&a.total_commits));
    ranked
        .into_iter()
        .take(limit)
        .map(|u| LeaderboardEntry {
            username: u.username.clone(),
            total_commits: u.total_commits,
            avatar_url: u.avatar_url.clone(),
        })
        .collect()
}

/// All users' commits flattened, newest first, top `limit`.
pub fn recent_commits(users: &[User], limit: usize) -> Vec<RecentCommit> {
    let mut feed: Vec<(&User, &crate::models::CommitRecord)> = users
        .iter()
        .flat_map(|user| user.commits.iter().map(move |commit| (user, commit)))
        .collect();

    // Sort on the full-precision timestamps, not the formatted strings
    feed.sort_by(|a, b| b.1.timestamp.cmp(&a.1.timestamp));

    feed.into_iter()
        .take(limit)
        .map(|(user, commit)| RecentCommit {
            id: commit.commit_id.clone(),
            message: commit.message.clone(),
            author: user.username.clone(),
            repo: commit.repository.clone(),
            time: format_utc_rfc3339(commit.timestamp),
            avatar_url: user.avatar_url.clone(),
        })
        .collect()
}

/// Global totals, recomputed from the raw commit arrays.
///
/// `total_commits` deliberately sums `commits.len()` rather than the
/// cached per-user counter, so a drifted cache cannot skew the
/// dashboard totals.
pub fn global_stats(users: &[User]) -> GlobalStats {
    let total_hackers = users.iter().filter(|u| !u.commits.is_empty()).count();
    let total_commits = users.iter().map(|u| u.commits.len()).sum();
    let total_projects = users
        .iter()
        .flat_map(|u| u.commits.iter().map(|c| c.repository.as_str()))
        .collect::<HashSet<_>>()
        .len();

    GlobalStats {
        total_commits,
        total_projects,
        total_hackers,
    }
}
