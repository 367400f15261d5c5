//! Push webhook
//!
//! Accepts GitHub-style push events signed with `X-Hub-Signature-256`. Requests
//! that fail verification never reach the pipeline.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use hmac::{Hmac, Mac};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info};

use crate::errors::AgentError;
use crate::models::deployment::DeploymentStatus;
use crate::server::state::ServerState;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
pub const EVENT_HEADER: &str = "x-github-event";

/// The subset of a push payload the agent reads
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref", default)]
    pub git_ref: Option<String>,

    #[serde(default)]
    pub head_commit: Option<HeadCommit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeadCommit {
    #[serde(default)]
    pub message: String,
}

impl PushEvent {
    pub fn commit_message(&self) -> String {
        self.head_commit
            .as_ref()
            .map(|commit| commit.message.clone())
            .unwrap_or_default()
    }
}

/// Webhook response
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
}

impl WebhookResponse {
    fn status(status: &str) -> Self {
        Self {
            status: status.to_string(),
            deployment_id: None,
        }
    }
}

/// Check `header` (`sha256=<hex>`) against the HMAC-SHA256 of `body`
pub fn verify_signature(secret: &[u8], body: &[u8], header: Option<&str>) -> Result<(), AgentError> {
    let header = header.ok_or_else(|| AgentError::Unauthorized("missing signature".to_string()))?;
    let hex_digest = header
        .strip_prefix("sha256=")
        .ok_or_else(|| AgentError::Unauthorized("unsupported signature scheme".to_string()))?;
    let expected = hex::decode(hex_digest)
        .map_err(|_| AgentError::Unauthorized("malformed signature".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AgentError::ConfigError(format!("invalid webhook secret: {}", e)))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| AgentError::Unauthorized("signature mismatch".to_string()))
}

/// Compute the `X-Hub-Signature-256` header value for `body`
pub fn sign(secret: &[u8], body: &[u8]) -> Result<String, AgentError> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AgentError::ConfigError(format!("invalid webhook secret: {}", e)))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Webhook handler
pub async fn webhook_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookResponse>), AgentError> {
    let secret = state
        .webhook_secret
        .as_ref()
        .ok_or_else(|| AgentError::Unauthorized("webhook secret is not configured".to_string()))?;
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    verify_signature(secret.expose_secret().as_bytes(), &body, signature)?;

    let event = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("push");
    match event {
        "push" => {}
        "ping" => return Ok((StatusCode::OK, Json(WebhookResponse::status("pong")))),
        other => {
            debug!(event = other, "Ignoring webhook event");
            return Ok((StatusCode::ACCEPTED, Json(WebhookResponse::status("ignored"))));
        }
    }

    let push: PushEvent = serde_json::from_slice(&body)
        .map_err(|e| AgentError::ValidationError(format!("invalid push payload: {}", e)))?;

    if let Some(wanted) = &state.git_ref {
        if push.git_ref.as_deref() != Some(wanted.as_str()) {
            debug!(git_ref = ?push.git_ref, "Ignoring push to another ref");
            return Ok((StatusCode::ACCEPTED, Json(WebhookResponse::status("ignored"))));
        }
    }

    let outcome = state.pipeline.on_push(push.commit_message()).await;
    let status = match outcome.deployment.status {
        DeploymentStatus::Running => "started",
        _ => "queued",
    };
    info!(deployment = %outcome.deployment.id, status, "Push accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(WebhookResponse {
            status: status.to_string(),
            deployment_id: Some(outcome.deployment.id),
        }),
    ))
}
