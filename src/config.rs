// SPDX-License-Identifier: MIT

//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup and cached in memory. In production
//! they are injected as environment variables by the deployment platform.

use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Non-sensitive ---
    /// GitHub OAuth client ID (public)
    pub github_client_id: String,
    /// GitHub App ID (public, used to match installations)
    pub github_app_id: String,
    /// GitHub App slug for the installation URL
    pub github_app_name: String,
    /// Frontend URL for OAuth redirects and CORS
    pub frontend_url: String,
    /// GCP project ID for Firestore
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,

    // --- Secrets ---
    /// GitHub OAuth client secret
    pub github_client_secret: String,
    /// GitHub App private key (PEM, RS256); None disables installation
    /// token minting
    pub github_app_private_key: Option<String>,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// HMAC key for signing the OAuth state parameter
    pub oauth_state_key: Vec<u8>,
    /// Webhook secret for X-Hub-Signature-256 verification; None skips
    /// verification (local dev)
    pub webhook_secret: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let jwt_signing_key = env::var("JWT_SIGNING_KEY")
            .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
            .into_bytes();

        Ok(Self {
            github_client_id: env::var("GITHUB_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("GITHUB_CLIENT_ID"))?,
            github_app_id: env::var("GITHUB_APP_ID")
                .map_err(|_| ConfigError::Missing("GITHUB_APP_ID"))?,
            github_app_name: env::var("GITHUB_APP_NAME")
                .map_err(|_| ConfigError::Missing("GITHUB_APP_NAME"))?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            github_client_secret: env::var("GITHUB_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("GITHUB_CLIENT_SECRET"))?,
            github_app_private_key: env::var("GITHUB_APP_PRIVATE_KEY").ok(),
            // Falls back to the session key so local dev needs one secret
            oauth_state_key: env::var("OAUTH_STATE_KEY")
                .map(String::into_bytes)
                .unwrap_or_else(|_| jwt_signing_key.clone()),
            webhook_secret: env::var("WEBHOOK_SECRET")
                .ok()
                .map(|v| v.trim().to_string()),
            jwt_signing_key,
        })
    }

    /// Fixed config for tests only.
    pub fn test_default() -> Self {
        Self {
            github_client_id: "test_client_id".to_string(),
            github_app_id: "12345".to_string(),
            github_app_name: "test-app".to_string(),
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            github_client_secret: "test_secret".to_string(),
            github_app_private_key: None,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_state_key_32_bytes_minimum".to_vec(),
            webhook_secret: None,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("GITHUB_CLIENT_ID", "test_id");
        env::set_var("GITHUB_CLIENT_SECRET", "test_secret");
        env::set_var("GITHUB_APP_ID", "99");
        env::set_var("GITHUB_APP_NAME", "test-app");
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.github_client_id, "test_id");
        assert_eq!(config.github_client_secret, "test_secret");
        assert_eq!(config.port, 8080);
        // State key falls back to the session key when unset
        assert_eq!(config.oauth_state_key, config.jwt_signing_key);
    }
}
