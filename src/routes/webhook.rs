// SPDX-License-Identifier: MIT

//! Webhook routes for GitHub push events.

use crate::error::{AppError, Result};
use crate::services::ingest;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook", post(handle_event))
}

/// Webhook acknowledgement body.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookResponse {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    commits_processed: Option<usize>,
}

/// Handle an incoming webhook delivery (POST).
///
/// The signature (when a secret is configured) is checked over the raw
/// body before anything is parsed. Only `push` events mutate state;
/// every other event kind is acknowledged and ignored so new GitHub
/// event types never turn into delivery failures.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>> {
    if let Some(secret) = &state.config.webhook_secret {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|h| h.to_str().ok());

        if !verify_signature(secret, &body, signature) {
            tracing::warn!("Webhook signature verification failed");
            return Err(AppError::Unauthorized);
        }
    }

    let event_kind = headers
        .get("x-github-event")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if event_kind != "push" {
        tracing::debug!(event = %event_kind, "Ignoring unhandled event type");
        return Ok(Json(WebhookResponse {
            message: "Event type not handled".to_string(),
            commits_processed: None,
        }));
    }

    let payload: ingest::PushPayload = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))?;

    // Malformed deliveries are rejected inside; storage failures bubble
    // up as 5xx so GitHub redelivers (safe under dedup)
    let applied = ingest::process_push(&state.db, payload).await?;

    Ok(Json(WebhookResponse {
        message: "Webhook processed successfully".to_string(),
        commits_processed: Some(applied.accepted),
    }))
}

/// Verify an `X-Hub-Signature-256` header against the raw body.
///
/// Header format is `sha256=<hex>`. Comparison is constant-time.
fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> bool {
    let Some(hex_digest) = header.and_then(|h| h.strip_prefix("sha256=")) else {
        return false;
    };
    let Ok(claimed) = hex::decode(hex_digest) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = mac.finalize().into_bytes();

    expected.ct_eq(claimed.as_slice()).into()
}
