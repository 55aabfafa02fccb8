// SPDX-License-Identifier: MIT

//! Webhook push ingestion: validate, normalize, apply.
//!
//! One logical transaction per delivery: the payload is validated and
//! normalized here, then handed to the db layer which resolves the user
//! and applies dedup + aggregation atomically.

use crate::db::firestore::PushApplied;
use crate::db::FirestoreDb;
use crate::error::AppError;
use crate::models::CommitRecord;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// GitHub push event payload (the fields this core consumes).
#[derive(Debug, Deserialize)]
pub struct PushPayload {
    pub sender: Option<PushSender>,
    pub repository: Option<PushRepository>,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
    /// Git ref the push targeted, e.g. "refs/heads/main"
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PushSender {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PushRepository {
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct PushCommit {
    /// Commit SHA; may be absent in malformed payloads
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// A validated, normalized push delivery ready to apply.
#[derive(Debug)]
pub struct NormalizedPush {
    pub github_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub records: Vec<CommitRecord>,
}

/// Validate and normalize a push payload.
///
/// Missing sender or repository rejects the delivery with a client
/// error before any state is touched. A delivery with an empty commits
/// array is still valid (it resolves/creates the user).
pub fn normalize_push(payload: PushPayload) -> Result<NormalizedPush, AppError> {
    let sender = payload
        .sender
        .ok_or_else(|| AppError::BadRequest("Missing sender in webhook payload".to_string()))?;
    let repository = payload
        .repository
        .ok_or_else(|| AppError::BadRequest("Missing repository in webhook payload".to_string()))?;

    let branch = payload
        .git_ref
        .as_deref()
        .and_then(branch_from_ref)
        .unwrap_or_else(|| "main".to_string());

    let records = payload
        .commits
        .into_iter()
        .map(|commit| CommitRecord {
            timestamp: parse_commit_timestamp(commit.timestamp.as_deref()),
            repository: repository.full_name.clone(),
            message: commit.message,
            commit_id: commit.id,
            branch: branch.clone(),
        })
        .collect();

    Ok(NormalizedPush {
        github_id: sender.id.to_string(),
        username: sender.login,
        avatar_url: sender.avatar_url,
        records,
    })
}

/// Apply one push delivery end to end.
pub async fn process_push(db: &FirestoreDb, payload: PushPayload) -> Result<PushApplied, AppError> {
    let push = normalize_push(payload)?;

    let applied = db
        .apply_push_atomic(
            &push.github_id,
            &push.username,
            push.avatar_url.as_deref(),
            &push.records,
        )
        .await?;

    tracing::info!(
        github_id = %push.github_id,
        username = %push.username,
        delivered = push.records.len(),
        accepted = applied.accepted,
        "Processed push delivery"
    );

    Ok(applied)
}

/// "refs/heads/main" -> "main"; other ref kinds yield None.
fn branch_from_ref(git_ref: &str) -> Option<String> {
    git_ref.strip_prefix("refs/heads/").map(String::from)
}

/// Parse the payload's ISO-like timestamp.
///
/// GitHub sends RFC3339 with an offset. An unparseable or missing value
/// falls back to arrival time so the record is kept rather than dropped.
fn parse_commit_timestamp(raw: Option<&str>) -> DateTime<Utc> {
    match raw.map(DateTime::parse_from_rfc3339) {
        Some(Ok(dt)) => dt.with_timezone(&Utc),
        Some(Err(e)) => {
            tracing::debug!(timestamp = ?raw, error = %e, "Unparseable commit timestamp, using arrival time");
            Utc::now()
        }
        None => Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn push_json() -> serde_json::Value {
        json!({
            "ref": "refs/heads/feature",
            "sender": { "id": 42, "login": "alice", "avatar_url": "https://a/u.png" },
            "repository": { "full_name": "org/x" },
            "commits": [
                { "id": "a1", "timestamp": "2025-06-01T12:00:00+02:00", "message": "fix" },
                { "id": "b2", "timestamp": "2025-06-01T12:01:00Z", "message": "feat" }
            ]
        })
    }

    #[test]
    fn test_normalize_push_maps_fields() {
        let payload: PushPayload = serde_json::from_value(push_json()).unwrap();
        let push = normalize_push(payload).unwrap();

        assert_eq!(push.github_id, "42");
        assert_eq!(push.username, "alice");
        assert_eq!(push.avatar_url.as_deref(), Some("https://a/u.png"));
        assert_eq!(push.records.len(), 2);
        assert_eq!(push.records[0].commit_id, "a1");
        assert_eq!(push.records[0].repository, "org/x");
        assert_eq!(push.records[0].branch, "feature");
        // Offset timestamps are converted to UTC
        assert_eq!(
            push.records[0].timestamp.to_rfc3339(),
            "2025-06-01T10:00:00+00:00"
        );
    }

    #[test]
    fn test_missing_sender_is_client_error() {
        let mut value = push_json();
        value.as_object_mut().unwrap().remove("sender");
        let payload: PushPayload = serde_json::from_value(value).unwrap();

        let err = normalize_push(payload).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_missing_repository_is_client_error() {
        let mut value = push_json();
        value.as_object_mut().unwrap().remove("repository");
        let payload: PushPayload = serde_json::from_value(value).unwrap();

        let err = normalize_push(payload).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_empty_commits_array_is_valid() {
        let mut value = push_json();
        value["commits"] = json!([]);
        let payload: PushPayload = serde_json::from_value(value).unwrap();

        let push = normalize_push(payload).unwrap();
        assert!(push.records.is_empty());
    }

    #[test]
    fn test_missing_commit_id_becomes_empty_string() {
        let mut value = push_json();
        value["commits"] = json!([{ "timestamp": "2025-06-01T12:00:00Z", "message": "oops" }]);
        let payload: PushPayload = serde_json::from_value(value).unwrap();

        let push = normalize_push(payload).unwrap();
        assert_eq!(push.records[0].commit_id, "");
    }

    #[test]
    fn test_bad_timestamp_falls_back_to_arrival_time() {
        let mut value = push_json();
        value["commits"] = json!([{ "id": "a1", "timestamp": "not-a-date", "message": "m" }]);
        let payload: PushPayload = serde_json::from_value(value).unwrap();

        let before = Utc::now();
        let push = normalize_push(payload).unwrap();
        let after = Utc::now();

        assert!(push.records[0].timestamp >= before);
        assert!(push.records[0].timestamp <= after);
    }

    #[test]
    fn test_non_branch_ref_defaults_to_main() {
        let mut value = push_json();
        value["ref"] = json!("refs/tags/v1.0");
        let payload: PushPayload = serde_json::from_value(value).unwrap();

        let push = normalize_push(payload).unwrap();
        assert_eq!(push.records[0].branch, "main");
    }
}
