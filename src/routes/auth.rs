// SPDX-License-Identifier: MIT

//! GitHub OAuth and App installation routes.

use axum::{
    extract::{Query, State},
    response::Redirect,
    routing::get,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, verify_session_token, SESSION_COOKIE};
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

/// OAuth state parameters older than this are rejected.
const STATE_MAX_AGE_MILLIS: u128 = 10 * 60 * 1000;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/github", get(auth_start))
        .route("/auth/github/callback", get(auth_callback))
        .route(
            "/auth/github/installation-callback",
            get(installation_callback),
        )
        .route("/auth/install", get(install_redirect))
        .route("/auth/status", get(auth_status))
        .route("/auth/logout", get(logout))
}

/// Query parameters for starting OAuth flow.
#[derive(Deserialize)]
pub struct AuthStartParams {
    /// Frontend URL to redirect back to after OAuth completes.
    /// If not provided, uses FRONTEND_URL config.
    #[serde(default)]
    redirect_uri: Option<String>,
}

/// Start OAuth flow - redirect to GitHub authorization.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthStartParams>,
    headers: axum::http::HeaderMap,
) -> Result<Redirect> {
    let frontend_url = params
        .redirect_uri
        .unwrap_or_else(|| state.config.frontend_url.clone());

    let oauth_state = sign_state(&frontend_url, &state.config.oauth_state_key)?;
    let callback_url = callback_url_from_headers(&headers);

    let auth_url = format!(
        "https://github.com/login/oauth/authorize?\
         client_id={}&\
         scope=read:user,user:email&\
         redirect_uri={}&\
         state={}",
        state.config.github_client_id,
        urlencoding::encode(&callback_url),
        oauth_state
    );

    tracing::info!(
        client_id = %state.config.github_client_id,
        frontend_url = %frontend_url,
        "Starting OAuth flow, redirecting to GitHub"
    );

    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    code: String,
    state: String,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange code, detect installation, create session.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    headers: axum::http::HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect)> {
    // Decode and verify the frontend URL from the state parameter
    let frontend_url = verify_and_decode_state(&params.state, &state.config.oauth_state_key)
        .unwrap_or_else(|| {
            tracing::warn!(
                "Invalid or tampered state parameter, falling back to default frontend URL"
            );
            state.config.frontend_url.clone()
        });

    // Check for OAuth errors
    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from GitHub");
        let redirect = format!("{}/login?error={}", frontend_url, error);
        return Ok((jar, Redirect::temporary(&redirect)));
    }

    tracing::info!("Exchanging authorization code for access token");

    let callback_url = callback_url_from_headers(&headers);
    let access_token = state
        .github
        .exchange_code(&params.code, &callback_url)
        .await?;

    let github_user = state.github.get_authenticated_user(&access_token).await?;
    let installation_id = state.github.find_app_installation(&access_token).await?;

    let github_id = github_user.id.to_string();
    let installation_str = installation_id.map(|id| id.to_string());

    state
        .db
        .update_identity_atomic(
            &github_id,
            &github_user.login,
            github_user.avatar_url.as_deref(),
            installation_str.as_deref(),
        )
        .await?;

    tracing::info!(
        github_id = %github_id,
        username = %github_user.login,
        app_installed = installation_id.is_some(),
        "OAuth successful, user stored"
    );

    let token = create_jwt(&github_id, &state.config.jwt_signing_key)?;
    let jar = jar.add(session_cookie(token));

    // Users without the App installed are sent to the install flow so
    // their pushes actually reach the webhook
    let redirect = if installation_id.is_some() {
        format!("{}/dashboard", frontend_url)
    } else {
        format!("{}/callback?needsInstallation=true", frontend_url)
    };

    Ok((jar, Redirect::temporary(&redirect)))
}

#[derive(Deserialize)]
pub struct InstallationCallbackParams {
    installation_id: String,
}

/// Record the installation ID after the user installs the GitHub App.
async fn installation_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<InstallationCallbackParams>,
) -> Result<Redirect> {
    let github_id = session_user(&jar, &state).ok_or(AppError::Unauthorized)?;

    let installation_id: u64 = params
        .installation_id
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid installation_id".to_string()))?;

    // With an App private key configured, confirm the installation is
    // real before recording it; the query parameter is attacker-supplied
    if state.config.github_app_private_key.is_some() {
        state.github.installation_token(installation_id).await?;
    }

    let user = state
        .db
        .get_user(&github_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", github_id)))?;

    state
        .db
        .update_identity_atomic(
            &github_id,
            &user.username,
            user.avatar_url.as_deref(),
            Some(&params.installation_id),
        )
        .await?;

    tracing::info!(
        github_id = %github_id,
        installation_id = %params.installation_id,
        "App installation recorded"
    );

    Ok(Redirect::temporary(&format!(
        "{}/dashboard",
        state.config.frontend_url
    )))
}

/// Send an authenticated user to the GitHub App installation page.
async fn install_redirect(State(state): State<Arc<AppState>>, jar: CookieJar) -> Redirect {
    if session_user(&jar, &state).is_none() {
        return Redirect::temporary("/auth/github");
    }

    let install_url = format!(
        "https://github.com/apps/{}/installations/new",
        state.config.github_app_name
    );
    Redirect::temporary(&install_url)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusUser {
    github_id: String,
    username: String,
    avatar_url: Option<String>,
    has_git_hub_app: bool,
}

#[derive(Serialize)]
struct StatusResponse {
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<StatusUser>,
}

/// Session status for the front end.
async fn auth_status(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<Json<StatusResponse>> {
    let Some(github_id) = session_user(&jar, &state) else {
        return Ok(Json(StatusResponse {
            authenticated: false,
            user: None,
        }));
    };

    let user = state.db.get_user(&github_id).await?;

    Ok(Json(StatusResponse {
        authenticated: true,
        user: user.map(|u| StatusUser {
            github_id: u.github_id,
            username: u.username,
            avatar_url: u.avatar_url,
            has_git_hub_app: u.installation_id.is_some(),
        }),
    }))
}

/// Clear the session cookie.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    (jar, Redirect::temporary(&state.config.frontend_url))
}

// ─── Helpers ─────────────────────────────────────────────────

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(30))
        .build()
}

/// GitHub ID from a valid session cookie, if present.
fn session_user(jar: &CookieJar, state: &AppState) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| verify_session_token(cookie.value(), &state.config.jwt_signing_key))
}

/// Build the OAuth callback URL from the request's Host header.
fn callback_url_from_headers(headers: &axum::http::HeaderMap) -> String {
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| {
            std::env::var("API_HOST").unwrap_or_else(|_| "localhost:8080".to_string())
        });

    let scheme = if host.contains("localhost") || host.contains("127.0.0.1") {
        "http"
    } else {
        "https"
    };

    format!("{}://{}/auth/github/callback", scheme, host)
}

/// Sign the OAuth state parameter: `frontend_url|timestamp_hex|sig_hex`,
/// base64url encoded.
pub fn sign_state(frontend_url: &str, key: &[u8]) -> Result<String> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_millis();

    let state_payload = format!("{}|{:x}", frontend_url, timestamp);

    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(state_payload.as_bytes());
    let signature = mac.finalize().into_bytes();

    let signed_state = format!("{}|{}", state_payload, hex::encode(signature));

    Ok(URL_SAFE_NO_PAD.encode(signed_state.as_bytes()))
}

/// Verify an OAuth state parameter and recover the frontend URL.
///
/// Rejects bad signatures and stale timestamps.
pub fn verify_and_decode_state(state: &str, key: &[u8]) -> Option<String> {
    let decoded = URL_SAFE_NO_PAD.decode(state).ok()?;
    let decoded_str = String::from_utf8(decoded).ok()?;

    let (payload, signature_hex) = decoded_str.rsplit_once('|')?;
    let signature = hex::decode(signature_hex).ok()?;

    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(payload.as_bytes());
    mac.verify_slice(&signature).ok()?;

    let (frontend_url, timestamp_hex) = payload.rsplit_once('|')?;
    let timestamp = u128::from_str_radix(timestamp_hex, 16).ok()?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()?
        .as_millis();

    if now.saturating_sub(timestamp) > STATE_MAX_AGE_MILLIS {
        return None;
    }

    Some(frontend_url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"test_state_key_32_bytes_minimum";

    #[test]
    fn test_state_round_trip() {
        let signed = sign_state("http://localhost:5173", KEY).unwrap();
        let decoded = verify_and_decode_state(&signed, KEY);

        assert_eq!(decoded, Some("http://localhost:5173".to_string()));
    }

    #[test]
    fn test_tampered_state_rejected() {
        let signed = sign_state("http://localhost:5173", KEY).unwrap();

        // Re-encode with a different frontend URL but the old signature
        let decoded = URL_SAFE_NO_PAD.decode(&signed).unwrap();
        let text = String::from_utf8(decoded).unwrap();
        let tampered_text = text.replacen("localhost:5173", "evil.example", 1);
        let tampered = URL_SAFE_NO_PAD.encode(tampered_text.as_bytes());

        assert_eq!(verify_and_decode_state(&tampered, KEY), None);
    }

    #[test]
    fn test_wrong_key_rejected() {
        let signed = sign_state("http://localhost:5173", KEY).unwrap();

        assert_eq!(
            verify_and_decode_state(&signed, b"another_key_32_bytes_padded_out"),
            None
        );
    }

    #[test]
    fn test_garbage_state_rejected() {
        assert_eq!(verify_and_decode_state("not-base64!!", KEY), None);
        assert_eq!(verify_and_decode_state("", KEY), None);
    }
}
