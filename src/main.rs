// SPDX-License-Identifier: MIT

//! Commit-Tracker API Server
//!
//! Records GitHub push events per user and serves the leaderboard,
//! commit feed, stats, and intensity endpoints for the dashboard.

use commit_tracker::{config::Config, db::FirestoreDb, services::GithubClient, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Commit-Tracker API");

    // Initialize Firestore database
    let db = FirestoreDb::new(&config.gcp_project_id)
        .await
        .expect("Failed to connect to Firestore");

    // Initialize GitHub client (OAuth + App installation tokens)
    let github = GithubClient::new(
        config.github_client_id.clone(),
        config.github_client_secret.clone(),
        config.github_app_id.clone(),
        config.github_app_private_key.clone(),
    );
    tracing::info!(app_id = %config.github_app_id, "GitHub client initialized");

    // Build shared state
    let state = Arc::new(AppState { config: config.clone(), db, github });

    // Build router
    let app = commit_tracker::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("commit_tracker=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
