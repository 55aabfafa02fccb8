// SPDX-License-Identifier: MIT

use commit_tracker::config::Config;
use commit_tracker::db::FirestoreDb;
use commit_tracker::routes::create_router;
use commit_tracker::services::GithubClient;
use commit_tracker::AppState;
use std::sync::Arc;

/// Create a mock database connection (offline).
#[allow(dead_code)]
pub fn test_db_offline() -> FirestoreDb {
    FirestoreDb::new_mock()
}

/// Create a test app with offline mock dependencies.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>) {
    create_test_app_with_config(Config::test_default())
}

/// Create a test app with a caller-supplied config (e.g. to enable
/// webhook signature verification).
#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> (axum::Router, Arc<AppState>) {
    let db = test_db_offline();
    let github = GithubClient::new(
        config.github_client_id.clone(),
        config.github_client_secret.clone(),
        config.github_app_id.clone(),
        config.github_app_private_key.clone(),
    );

    let state = Arc::new(AppState { config, db, github });

    (create_router(state.clone()), state)
}
