//! User document: commit event log plus derived aggregates.
//!
//! One Firestore document per user holds the append-only commit log and
//! the counters derived from it (`total_commits`, per-repository stats).
//! Keeping both on one document lets a single transaction update them
//! together, so `total_commits == commits.len()` holds at every
//! observable state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single commit observed via a webhook push delivery.
///
/// Immutable once appended to the log. `commit_id` is the external
/// identity used for deduplication; malformed payloads may leave it
/// empty, in which case the record is never deduplicated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    pub commit_id: String,
    pub timestamp: DateTime<Utc>,
    /// Repository full name, e.g. "org/repo"
    pub repository: String,
    pub message: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Per-repository aggregate, one entry per (user, repository full name).
///
/// Derived from the commit log and rebuildable from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryStats {
    /// Short name ("repo" from "org/repo")
    pub name: String,
    pub full_name: String,
    pub commit_count: u32,
    pub last_commit_at: DateTime<Utc>,
}

/// User profile stored in Firestore (document ID = `github_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// GitHub user ID (stringified, immutable)
    pub github_id: String,
    /// GitHub login, overwritten on re-auth
    pub username: String,
    /// Avatar URL, overwritten on re-auth
    pub avatar_url: Option<String>,
    /// Cached count, kept equal to `commits.len()` transactionally
    #[serde(default)]
    pub total_commits: u32,
    /// Append-only commit log, in arrival order
    #[serde(default)]
    pub commits: Vec<CommitRecord>,
    /// Per-repository aggregates, keyed by `full_name`
    #[serde(default)]
    pub repositories: Vec<RepositoryStats>,
    /// GitHub App installation ID, if the app is installed
    #[serde(default)]
    pub installation_id: Option<String>,
    /// When user first connected or was first seen via webhook
    pub created_at: DateTime<Utc>,
    /// Timestamp of most recent mutation
    pub last_updated: DateTime<Utc>,
}

impl User {
    /// Create a new user shell with zero counters.
    pub fn new(github_id: String, username: String, avatar_url: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            github_id,
            username,
            avatar_url,
            total_commits: 0,
            commits: Vec::new(),
            repositories: Vec::new(),
            installation_id: None,
            created_at: now,
            last_updated: now,
        }
    }

    /// Filter a delivery batch down to commits not already in the log.
    ///
    /// A candidate is accepted iff no existing record shares its
    /// non-empty `commit_id`. Empty IDs are treated as always-unique
    /// and never deduplicated. Relative order within the batch is
    /// preserved. Re-delivering an already-seen batch yields nothing,
    /// which is what makes at-least-once webhook delivery safe.
    pub fn accept_new(&self, candidates: &[CommitRecord]) -> Vec<CommitRecord> {
        candidates
            .iter()
            .filter(|candidate| {
                candidate.commit_id.is_empty()
                    || !self
                        .commits
                        .iter()
                        .any(|existing| existing.commit_id == candidate.commit_id)
            })
            .cloned()
            .collect()
    }

    /// Append accepted records and update the derived counters.
    ///
    /// Must only be given the output of [`accept_new`](Self::accept_new)
    /// for this user; both run under the same storage transaction. An
    /// empty batch is a no-op and does not touch `last_updated`.
    pub fn apply_accepted(&mut self, accepted: &[CommitRecord]) {
        if accepted.is_empty() {
            return;
        }

        for record in accepted {
            self.total_commits += 1;
            self.update_repository_stats(record);
        }

        self.commits.extend_from_slice(accepted);
        self.last_updated = Utc::now();
    }

    /// Dedup + append + aggregate in one step.
    ///
    /// Returns the number of commits actually accepted.
    pub fn add_commits(&mut self, candidates: &[CommitRecord]) -> usize {
        let accepted = self.accept_new(candidates);
        self.apply_accepted(&accepted);
        accepted.len()
    }

    /// Bump the repository entry for one accepted record.
    ///
    /// `last_commit_at` is overwritten with the record's timestamp, not
    /// maxed: an out-of-order earlier commit moves it backwards. This
    /// matches the shipped behavior and is pending product
    /// clarification before changing.
    fn update_repository_stats(&mut self, record: &CommitRecord) {
        if let Some(stats) = self
            .repositories
            .iter_mut()
            .find(|r| r.full_name == record.repository)
        {
            stats.commit_count += 1;
            stats.last_commit_at = record.timestamp;
        } else {
            let name = record
                .repository
                .rsplit('/')
                .next()
                .unwrap_or(&record.repository)
                .to_string();
            self.repositories.push(RepositoryStats {
                name,
                full_name: record.repository.clone(),
                commit_count: 1,
                last_commit_at: record.timestamp,
            });
        }
    }

    /// Commits with `timestamp >= now - window_minutes`.
    pub fn recent_commits(&self, now: DateTime<Utc>, window_minutes: i64) -> Vec<&CommitRecord> {
        let cutoff = now - chrono::Duration::minutes(window_minutes);
        self.commits
            .iter()
            .filter(|c| c.timestamp >= cutoff)
            .collect()
    }

    /// Per-user intensity over a short window.
    ///
    /// The stricter 5-minute helper; the public endpoint uses the
    /// 20-minute window via [`crate::services::intensity`].
    pub fn commit_intensity(&self, now: DateTime<Utc>, window_minutes: i64) -> f64 {
        crate::services::intensity::intensity(
            &self.commits,
            now,
            window_minutes,
            crate::services::intensity::DEFAULT_SATURATION_COUNT,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap()
    }

    fn commit(id: &str, repo: &str, minute: u32) -> CommitRecord {
        CommitRecord {
            commit_id: id.to_string(),
            timestamp: ts(minute),
            repository: repo.to_string(),
            message: format!("commit {}", id),
            branch: "main".to_string(),
        }
    }

    fn check_invariants(user: &User) {
        assert_eq!(user.total_commits as usize, user.commits.len());
        let repo_sum: u32 = user.repositories.iter().map(|r| r.commit_count).sum();
        assert_eq!(repo_sum as usize, user.commits.len());
        for repo in &user.repositories {
            let actual = user
                .commits
                .iter()
                .filter(|c| c.repository == repo.full_name)
                .count();
            assert_eq!(repo.commit_count as usize, actual);
        }
    }

    #[test]
    fn test_first_delivery_creates_aggregates() {
        let mut user = User::new("1".into(), "alice".into(), None);
        let batch = vec![
            commit("a", "org/x", 1),
            commit("b", "org/x", 2),
            commit("c", "org/x", 3),
        ];

        let accepted = user.add_commits(&batch);

        assert_eq!(accepted, 3);
        assert_eq!(user.total_commits, 3);
        assert_eq!(user.repositories.len(), 1);
        assert_eq!(user.repositories[0].full_name, "org/x");
        assert_eq!(user.repositories[0].name, "x");
        assert_eq!(user.repositories[0].commit_count, 3);
        check_invariants(&user);
    }

    #[test]
    fn test_replayed_delivery_is_noop() {
        let mut user = User::new("1".into(), "alice".into(), None);
        let batch = vec![
            commit("a", "org/x", 1),
            commit("b", "org/x", 2),
            commit("c", "org/x", 3),
        ];

        user.add_commits(&batch);
        let accepted_again = user.add_commits(&batch);

        assert_eq!(accepted_again, 0);
        assert_eq!(user.total_commits, 3);
        assert_eq!(user.commits.len(), 3);
        check_invariants(&user);
    }

    #[test]
    fn test_second_repo_gets_own_stats_entry() {
        let mut user = User::new("1".into(), "alice".into(), None);
        user.add_commits(&[
            commit("a", "org/x", 1),
            commit("b", "org/x", 2),
            commit("c", "org/x", 3),
        ]);
        user.add_commits(&[commit("d", "org/y", 4), commit("e", "org/y", 5)]);

        assert_eq!(user.total_commits, 5);
        assert_eq!(user.repositories.len(), 2);
        let x = user
            .repositories
            .iter()
            .find(|r| r.full_name == "org/x")
            .unwrap();
        let y = user
            .repositories
            .iter()
            .find(|r| r.full_name == "org/y")
            .unwrap();
        assert_eq!(x.commit_count, 3);
        assert_eq!(y.commit_count, 2);
        check_invariants(&user);
    }

    #[test]
    fn test_partial_overlap_accepts_only_new() {
        let mut user = User::new("1".into(), "alice".into(), None);
        user.add_commits(&[commit("a", "org/x", 1), commit("b", "org/x", 2)]);

        let accepted = user.add_commits(&[commit("b", "org/x", 2), commit("c", "org/x", 3)]);

        assert_eq!(accepted, 1);
        assert_eq!(user.total_commits, 3);
        check_invariants(&user);
    }

    #[test]
    fn test_dedup_idempotence() {
        // add_commits(add_commits(log, B), B) == add_commits(log, B)
        let batch = vec![commit("a", "org/x", 1), commit("b", "org/y", 2)];

        let mut once = User::new("1".into(), "alice".into(), None);
        once.add_commits(&batch);

        let mut twice = User::new("1".into(), "alice".into(), None);
        twice.add_commits(&batch);
        twice.add_commits(&batch);

        assert_eq!(once.total_commits, twice.total_commits);
        assert_eq!(once.commits.len(), twice.commits.len());
        let ids: Vec<_> = once.commits.iter().map(|c| &c.commit_id).collect();
        let ids_twice: Vec<_> = twice.commits.iter().map(|c| &c.commit_id).collect();
        assert_eq!(ids, ids_twice);
    }

    #[test]
    fn test_empty_commit_id_never_deduplicated() {
        // Malformed commits without IDs are always accepted, as shipped.
        let mut user = User::new("1".into(), "alice".into(), None);
        let nameless = commit("", "org/x", 1);

        user.add_commits(&[nameless.clone()]);
        let accepted = user.add_commits(&[nameless]);

        assert_eq!(accepted, 1);
        assert_eq!(user.total_commits, 2);
        check_invariants(&user);
    }

    #[test]
    fn test_overlapping_deliveries_converge_regardless_of_order() {
        // Two concurrent deliveries sharing a commit are serialized by
        // the storage transaction; the loser reruns against the winner's
        // document. Whichever order they land in, nothing is lost and
        // nothing is double-counted.
        let batch_a = vec![commit("a", "org/x", 1), commit("shared", "org/x", 2)];
        let batch_b = vec![commit("shared", "org/x", 2), commit("b", "org/y", 3)];

        let mut ab = User::new("1".into(), "alice".into(), None);
        ab.add_commits(&batch_a);
        ab.add_commits(&batch_b);

        let mut ba = User::new("1".into(), "alice".into(), None);
        ba.add_commits(&batch_b);
        ba.add_commits(&batch_a);

        assert_eq!(ab.total_commits, 3);
        assert_eq!(ba.total_commits, 3);
        let mut ids_ab: Vec<_> = ab.commits.iter().map(|c| c.commit_id.clone()).collect();
        let mut ids_ba: Vec<_> = ba.commits.iter().map(|c| c.commit_id.clone()).collect();
        ids_ab.sort();
        ids_ba.sort();
        assert_eq!(ids_ab, ids_ba);
        check_invariants(&ab);
        check_invariants(&ba);
    }

    #[test]
    fn test_batch_order_preserved() {
        let mut user = User::new("1".into(), "alice".into(), None);
        user.add_commits(&[
            commit("c", "org/x", 3),
            commit("a", "org/x", 1),
            commit("b", "org/x", 2),
        ]);

        let ids: Vec<_> = user.commits.iter().map(|c| c.commit_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_last_commit_at_overwritten_not_maxed() {
        // Observed behavior: an out-of-order earlier commit moves
        // last_commit_at backwards.
        let mut user = User::new("1".into(), "alice".into(), None);
        user.add_commits(&[commit("a", "org/x", 30)]);
        assert_eq!(user.repositories[0].last_commit_at, ts(30));

        user.add_commits(&[commit("b", "org/x", 10)]);
        assert_eq!(user.repositories[0].last_commit_at, ts(10));
    }

    #[test]
    fn test_empty_batch_does_not_touch_last_updated() {
        let mut user = User::new("1".into(), "alice".into(), None);
        user.add_commits(&[commit("a", "org/x", 1)]);
        let before = user.last_updated;

        let accepted = user.add_commits(&[commit("a", "org/x", 1)]);

        assert_eq!(accepted, 0);
        assert_eq!(user.last_updated, before);
    }

    #[test]
    fn test_recent_commits_window() {
        let mut user = User::new("1".into(), "alice".into(), None);
        user.add_commits(&[
            commit("a", "org/x", 0),
            commit("b", "org/x", 25),
            commit("c", "org/x", 29),
        ]);

        let recent = user.recent_commits(ts(30), 20);
        assert_eq!(recent.len(), 2);
    }
}
