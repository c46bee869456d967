//! Webhook endpoint handlers.
//!
//! The gate runs entirely before any state mutation:
//! 1. Parse and validate the envelope (400 on malformed or unknown type)
//! 2. Check the topic allow-list (403, fail closed when the list is empty)
//! 3. Verify the signature (403 on any failure)
//!
//! Only then does the router dispatch by message kind.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use axum::{extract::State, http::StatusCode, Json};
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::envelope::{Envelope, MessageKind, RawEnvelope};
use crate::error::WebhookError;
use crate::process::{self, ProcessContext};
use crate::web::signature::SignatureVerifier;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: Arc<SignatureVerifier>,
    pub http: Client,
    pub ctx: ProcessContext,
}

impl AppState {
    pub fn new(
        config: Config,
        verifier: SignatureVerifier,
        http: Client,
        ctx: ProcessContext,
    ) -> Self {
        Self {
            config: Arc::new(config),
            verifier: Arc::new(verifier),
            http,
            ctx,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness probe endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "active" })
}

// =============================================================================
// SNS Webhook
// =============================================================================

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// SNS webhook endpoint: gate, then route by message kind.
pub async fn sns_webhook(
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<WebhookResponse>), WebhookError> {
    let raw: RawEnvelope = serde_json::from_str(&body)
        .map_err(|e| WebhookError::MalformedEnvelope(format!("invalid JSON envelope: {e}")))?;
    let envelope = Envelope::from_raw(raw)?;

    info!(
        kind = envelope.kind.as_str(),
        message_id = %envelope.message_id,
        topic_arn = %envelope.topic_arn,
        "sns_webhook_received"
    );

    authorize_topic(&state.config, &envelope)?;

    if state.config.signature_validation_bypassed() {
        warn!(
            environment = %state.config.environment,
            reason = "SKIP_SIGNATURE_VALIDATION set",
            "signature_validation_bypassed"
        );
    } else {
        state.verifier.verify(&envelope).await?;
    }

    let status = match envelope.kind {
        MessageKind::SubscriptionConfirmation => {
            match confirm_subscription(&state.http, &envelope).await {
                Ok(()) => {
                    info!(message_id = %envelope.message_id, "subscription_confirmed");
                    "confirmed"
                }
                Err(e) => {
                    // Upstream failure: logged, never a 5xx.
                    error!(
                        message_id = %envelope.message_id,
                        error = %e,
                        "subscription_confirmation_failed"
                    );
                    "confirmation_failed"
                }
            }
        }
        MessageKind::Notification => {
            let summary = process::handle_notification(&state.ctx, &envelope).await;
            info!(
                message_id = %envelope.message_id,
                records_applied = summary.records_applied,
                "sns_notification_handled"
            );
            "processed"
        }
        MessageKind::UnsubscribeConfirmation => {
            info!(message_id = %envelope.message_id, "unsubscribe_acknowledged");
            "acknowledged"
        }
    };

    Ok((
        StatusCode::OK,
        Json(WebhookResponse {
            status,
            message_id: Some(envelope.message_id),
        }),
    ))
}

/// Exact-match allow-list check. An empty list rejects everything.
fn authorize_topic(config: &Config, envelope: &Envelope) -> Result<(), WebhookError> {
    if config.topic_validation_bypassed() {
        warn!(
            environment = %config.environment,
            topic_arn = %envelope.topic_arn,
            reason = "SKIP_TOPIC_VALIDATION set",
            "topic_validation_bypassed"
        );
        return Ok(());
    }

    if config
        .topic_allowlist
        .iter()
        .any(|arn| arn == &envelope.topic_arn)
    {
        Ok(())
    } else {
        Err(WebhookError::UnauthorizedTopic(envelope.topic_arn.clone()))
    }
}

/// Confirm a subscription by calling its subscribe URL; requires a 2xx.
async fn confirm_subscription(http: &Client, envelope: &Envelope) -> Result<()> {
    let url = envelope
        .subscribe_url
        .as_deref()
        .context("SubscribeURL missing")?;

    let response = http
        .get(url)
        .send()
        .await
        .context("Failed to call subscribe URL")?;

    let status = response.status();
    if !status.is_success() {
        bail!("subscribe URL returned {status}");
    }

    Ok(())
}
