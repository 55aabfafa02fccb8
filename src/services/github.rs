// SPDX-License-Identifier: MIT

//! GitHub API client for the OAuth and App installation flows.
//!
//! Handles:
//! - OAuth code exchange
//! - Authenticated user fetch
//! - Installation discovery (is our App installed for this user?)
//! - App JWT minting and installation access tokens, with an in-process
//!   cache so each Cloud Run instance mints at most one token per
//!   installation until it nears expiry

use crate::error::AppError;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;

const API_BASE: &str = "https://api.github.com";
const OAUTH_BASE: &str = "https://github.com";
const GITHUB_ACCEPT: &str = "application/vnd.github+json";
// GitHub rejects requests without a User-Agent
const USER_AGENT: &str = "commit-tracker";

/// Refresh installation tokens this long before they expire.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// GitHub API client.
#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    oauth_base: String,
    client_id: String,
    client_secret: String,
    app_id: String,
    app_private_key: Option<String>,
    /// Installation access tokens, keyed by installation id
    installation_tokens: Arc<DashMap<u64, CachedInstallationToken>>,
}

#[derive(Clone)]
struct CachedInstallationToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Authenticated GitHub user profile.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubUser {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// One App installation visible to the authenticated user.
#[derive(Debug, Clone, Deserialize)]
pub struct Installation {
    pub id: u64,
    pub app_id: u64,
}

#[derive(Deserialize)]
struct InstallationList {
    #[serde(default)]
    installations: Vec<Installation>,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: String,
}

#[derive(serde::Serialize)]
struct AppJwtClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

impl GithubClient {
    pub fn new(
        client_id: String,
        client_secret: String,
        app_id: String,
        app_private_key: Option<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: API_BASE.to_string(),
            oauth_base: OAUTH_BASE.to_string(),
            client_id,
            client_secret,
            app_id,
            app_private_key,
            installation_tokens: Arc::new(DashMap::new()),
        }
    }

    // ─── OAuth ───────────────────────────────────────────────────

    /// Exchange an OAuth authorization code for a user access token.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, AppError> {
        let url = format!("{}/login/oauth/access_token", self.oauth_base);
        let response = self
            .http
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| AppError::GitHubApi(format!("Token exchange request failed: {}", e)))?;

        let body: AccessTokenResponse = self.check_response_json(response).await?;
        body.access_token.ok_or_else(|| {
            AppError::GitHubApi(format!(
                "Token exchange rejected: {}",
                body.error_description
                    .unwrap_or_else(|| "no access token in response".to_string())
            ))
        })
    }

    /// Fetch the authenticated user's profile.
    pub async fn get_authenticated_user(&self, access_token: &str) -> Result<GithubUser, AppError> {
        let url = format!("{}/user", self.api_base);
        self.get_json(&url, access_token).await
    }

    /// List App installations visible to the authenticated user.
    pub async fn list_installations(
        &self,
        access_token: &str,
    ) -> Result<Vec<Installation>, AppError> {
        let url = format!("{}/user/installations", self.api_base);
        let list: InstallationList = self.get_json(&url, access_token).await?;
        Ok(list.installations)
    }

    /// Find this App's installation for the authenticated user, if any.
    pub async fn find_app_installation(
        &self,
        access_token: &str,
    ) -> Result<Option<u64>, AppError> {
        let installations = self.list_installations(access_token).await?;
        Ok(match_installation(&installations, &self.app_id))
    }

    // ─── App / Installation Tokens ───────────────────────────────

    /// Mint a short-lived App JWT (RS256 over the App private key).
    pub fn create_app_jwt(&self) -> Result<String, AppError> {
        let pem = self.app_private_key.as_deref().ok_or_else(|| {
            AppError::GitHubApi("No App private key configured".to_string())
        })?;

        let now = Utc::now().timestamp();
        let claims = AppJwtClaims {
            // Backdated to tolerate clock drift
            iat: now - 60,
            exp: now + 10 * 60,
            iss: self.app_id.clone(),
        };

        let key = jsonwebtoken::EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|e| AppError::GitHubApi(format!("Invalid App private key: {}", e)))?;

        jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256),
            &claims,
            &key,
        )
        .map_err(|e| AppError::GitHubApi(format!("App JWT signing failed: {}", e)))
    }

    /// Get an installation access token, minting one if the cached token
    /// is missing or close to expiry.
    pub async fn installation_token(&self, installation_id: u64) -> Result<String, AppError> {
        if let Some(cached) = self.installation_tokens.get(&installation_id) {
            if token_still_valid(cached.expires_at, Utc::now()) {
                return Ok(cached.token.clone());
            }
        }

        let app_jwt = self.create_app_jwt()?;
        let url = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base, installation_id
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&app_jwt)
            .header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| AppError::GitHubApi(format!("Installation token request failed: {}", e)))?;

        let body: InstallationTokenResponse = self.check_response_json(response).await?;

        let expires_at = DateTime::parse_from_rfc3339(&body.expires_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| AppError::GitHubApi(format!("Bad token expiry from GitHub: {}", e)))?;

        self.installation_tokens.insert(
            installation_id,
            CachedInstallationToken {
                token: body.token.clone(),
                expires_at,
            },
        );

        tracing::debug!(installation_id, "Minted installation access token");

        Ok(body.token)
    }

    // ─── Helpers ─────────────────────────────────────────────────

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, GITHUB_ACCEPT)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| AppError::GitHubApi(format!("Request failed: {}", e)))?;

        self.check_response_json(response).await
    }

    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::GitHubApi(format!(
                "GitHub returned {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::GitHubApi(format!("Invalid JSON from GitHub: {}", e)))
    }
}

/// Match our App's installation in a user's installation list.
fn match_installation(installations: &[Installation], app_id: &str) -> Option<u64> {
    let app_id: u64 = app_id.parse().ok()?;
    installations
        .iter()
        .find(|inst| inst.app_id == app_id)
        .map(|inst| inst.id)
}

/// A cached token is reusable until it nears expiry.
fn token_still_valid(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at - Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) > now
}
