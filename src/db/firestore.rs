// SPDX-License-Identifier: MIT

//! Firestore client wrapper with typed operations.
//!
//! One document per user in the `users` collection holds the commit log
//! and its derived aggregates. Webhook deliveries are applied inside a
//! Firestore transaction so the log append and the counter updates
//! commit together; conflicting concurrent writes to the same user are
//! retried by Firestore with fresh data.

use crate::db::collections;
use crate::error::AppError;
use crate::models::{CommitRecord, User};
use futures_util::FutureExt;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

/// Result of applying one push delivery.
#[derive(Debug, Clone, Copy)]
pub struct PushApplied {
    /// Commits accepted after dedup (0 for a replayed delivery)
    pub accepted: usize,
    /// Whether a new user shell was created
    pub created_user: bool,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated
        // connection to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── User Operations ─────────────────────────────────────────

    /// Get a user by their GitHub ID.
    pub async fn get_user(&self, github_id: &str) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(github_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Fetch all user documents.
    ///
    /// The user population is dashboard-scale; queries project over this
    /// snapshot in memory.
    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    // ─── Atomic Push Processing ──────────────────────────────────

    /// Atomically apply one webhook push delivery to a user document.
    ///
    /// Resolves (or creates) the user, deduplicates the commit batch
    /// against the stored log, and writes the appended log together with
    /// the updated counters in a single transaction. `run_transaction`
    /// enrolls the read in the transaction's consistency selector, so a
    /// concurrent delivery to the same user fails the commit and the
    /// whole closure is retried against fresh data; dedup makes the
    /// retry safe.
    ///
    /// A fully-replayed delivery accepts zero commits and writes nothing.
    pub async fn apply_push_atomic(
        &self,
        github_id: &str,
        username: &str,
        avatar_url: Option<&str>,
        records: &[CommitRecord],
    ) -> Result<PushApplied, AppError> {
        let client = self.get_client()?;

        // Owned copies: the closure reruns on conflict retry
        let github_id = github_id.to_string();
        let username = username.to_string();
        let avatar_url = avatar_url.map(String::from);
        let records = records.to_vec();

        let applied = client
            .run_transaction(|db, transaction| {
                let github_id = github_id.clone();
                let username = username.clone();
                let avatar_url = avatar_url.clone();
                let records = records.clone();

                async move {
                    // 1. Transactional read: registered in the read set
                    //    for conflict detection at commit time
                    let existing: Option<User> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::USERS)
                        .obj()
                        .one(&github_id)
                        .await?;

                    let created_user = existing.is_none();
                    let mut user = existing.unwrap_or_else(|| {
                        User::new(github_id.clone(), username.clone(), avatar_url.clone())
                    });

                    // 2. Dedup against the stored log
                    let accepted = user.accept_new(&records);

                    // 3. Replayed delivery for a known user: nothing to write
                    if accepted.is_empty() && !created_user {
                        tracing::debug!(
                            github_id = %github_id,
                            batch = records.len(),
                            "Delivery fully deduplicated (idempotent skip)"
                        );
                        return Ok(PushApplied {
                            accepted: 0,
                            created_user: false,
                        });
                    }

                    // 4. Log append + counter updates as one in-memory step
                    user.apply_accepted(&accepted);

                    // 5. Write the whole document; committed with the read set
                    db.fluent()
                        .update()
                        .in_col(collections::USERS)
                        .document_id(&github_id)
                        .object(&user)
                        .add_to_transaction(transaction)?;

                    tracing::info!(
                        github_id = %github_id,
                        accepted = accepted.len(),
                        total_commits = user.total_commits,
                        created_user,
                        "Push delivery applied atomically"
                    );

                    Ok(PushApplied {
                        accepted: accepted.len(),
                        created_user,
                    })
                }
                .boxed()
            })
            .await
            .map_err(|e| AppError::Database(format!("Push transaction failed: {}", e)))?;

        Ok(applied)
    }

    // ─── Identity Updates (auth flow) ────────────────────────────

    /// Update identity fields from the OAuth flow without disturbing the
    /// commit log.
    ///
    /// Runs under the same conflict-checked transaction as push
    /// processing so a re-auth racing a webhook delivery cannot clobber
    /// freshly appended commits; on conflict the closure reruns against
    /// the fresh document.
    pub async fn update_identity_atomic(
        &self,
        github_id: &str,
        username: &str,
        avatar_url: Option<&str>,
        installation_id: Option<&str>,
    ) -> Result<User, AppError> {
        let client = self.get_client()?;

        let github_id = github_id.to_string();
        let username = username.to_string();
        let avatar_url = avatar_url.map(String::from);
        let installation_id = installation_id.map(String::from);

        let user = client
            .run_transaction(|db, transaction| {
                let github_id = github_id.clone();
                let username = username.clone();
                let avatar_url = avatar_url.clone();
                let installation_id = installation_id.clone();

                async move {
                    let existing: Option<User> = db
                        .fluent()
                        .select()
                        .by_id_in(collections::USERS)
                        .obj()
                        .one(&github_id)
                        .await?;

                    let mut user = existing.unwrap_or_else(|| {
                        User::new(github_id.clone(), username.clone(), avatar_url.clone())
                    });

                    // Display metadata is overwritten on every re-auth
                    user.username = username.clone();
                    if let Some(url) = avatar_url {
                        user.avatar_url = Some(url);
                    }
                    if let Some(id) = installation_id {
                        user.installation_id = Some(id);
                    }
                    user.last_updated = chrono::Utc::now();

                    db.fluent()
                        .update()
                        .in_col(collections::USERS)
                        .document_id(&github_id)
                        .object(&user)
                        .add_to_transaction(transaction)?;

                    tracing::info!(
                        github_id = %github_id,
                        username = %user.username,
                        installation = user.installation_id.is_some(),
                        "User identity updated"
                    );

                    Ok(user)
                }
                .boxed()
            })
            .await
            .map_err(|e| AppError::Database(format!("Identity transaction failed: {}", e)))?;

        Ok(user)
    }
}
