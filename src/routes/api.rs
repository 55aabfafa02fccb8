// SPDX-License-Identifier: MIT

//! API routes: public dashboard queries and the session-protected
//! profile endpoint.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::services::{intensity, query};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MAX_LIMIT: usize = 50;

/// Public query routes (intentionally unauthenticated; the dashboard
/// polls them without a session).
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/leaderboard", get(get_leaderboard))
        .route("/api/recent-commits", get(get_recent_commits))
        .route("/api/stats", get(get_stats))
        .route("/api/users/{github_id}/intensity", get(get_intensity))
}

/// Routes requiring a session (auth middleware applied in routes/mod.rs).
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/me", get(get_me))
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

// ─── Leaderboard ─────────────────────────────────────────────

/// Users with commits, ranked by total commits.
async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<query::LeaderboardEntry>>> {
    let limit = params
        .limit
        .unwrap_or(query::DEFAULT_LEADERBOARD_LIMIT)
        .min(MAX_LIMIT);

    let users = state.db.list_users().await?;
    Ok(Json(query::leaderboard(&users, limit)))
}

// ─── Recent Commits Feed ─────────────────────────────────────

/// Most recent commits across all users.
async fn get_recent_commits(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<Vec<query::RecentCommit>>> {
    let limit = params
        .limit
        .unwrap_or(query::DEFAULT_RECENT_COMMITS_LIMIT)
        .min(MAX_LIMIT);

    let users = state.db.list_users().await?;
    Ok(Json(query::recent_commits(&users, limit)))
}

// ─── Global Stats ────────────────────────────────────────────

/// Dashboard-wide totals.
async fn get_stats(State(state): State<Arc<AppState>>) -> Result<Json<query::GlobalStats>> {
    let users = state.db.list_users().await?;
    Ok(Json(query::global_stats(&users)))
}

// ─── Intensity ───────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntensityResponse {
    pub username: String,
    pub intensity: f64,
    pub recent_commits_count: usize,
}

/// Commit intensity for one user over the public 20-minute window.
async fn get_intensity(
    State(state): State<Arc<AppState>>,
    Path(github_id): Path<String>,
) -> Result<Json<IntensityResponse>> {
    let user = state
        .db
        .get_user(&github_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", github_id)))?;

    let now = chrono::Utc::now();
    let recent_commits_count =
        intensity::commits_in_window(&user.commits, now, intensity::DEFAULT_WINDOW_MINUTES);
    let score = intensity::intensity(
        &user.commits,
        now,
        intensity::DEFAULT_WINDOW_MINUTES,
        intensity::DEFAULT_SATURATION_COUNT,
    );

    Ok(Json(IntensityResponse {
        username: user.username,
        intensity: score,
        recent_commits_count,
    }))
}

// ─── Current User ────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub github_id: String,
    pub username: String,
    pub avatar_url: Option<String>,
    pub total_commits: u32,
    pub app_installed: bool,
    pub last_updated: String,
}

/// Get the session user's stored profile.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let profile = state
        .db
        .get_user(&user.github_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user.github_id)))?;

    Ok(Json(MeResponse {
        github_id: profile.github_id,
        username: profile.username,
        avatar_url: profile.avatar_url,
        total_commits: profile.total_commits,
        app_installed: profile.installation_id.is_some(),
        last_updated: format_utc_rfc3339(profile.last_updated),
    }))
}
