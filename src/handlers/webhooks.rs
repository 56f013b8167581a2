//! # Webhook Handlers
//!
//! Endpoints called by the messaging platform: the subscription handshake
//! (GET) and event deliveries (POST). The delivery handler captures the raw
//! request bytes exactly once before any JSON parsing; verification runs
//! over those bytes, never over a re-serialization.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::error::{self, ApiError};
use crate::normalization::{self, OBJECT_INSTAGRAM, WebhookEnvelope};
use crate::pipeline::DeliveryJob;
use crate::server::AppState;
use crate::webhook_verification::{verify_delivery_signature, verify_handshake};

/// Body of every successful delivery acknowledgment. Returned regardless of
/// per-event outcomes so the platform never retry-storms internal issues.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeliveryAck {
    pub ok: bool,
}

/// Subscription handshake query parameters
#[derive(Debug, Deserialize)]
pub struct HandshakeQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Platform subscription handshake
///
/// Echoes `hub.challenge` back as an unprocessed text body when `hub.mode`
/// is `subscribe` and the token matches. Every failure mode gets the same
/// generic 403.
#[utoipa::path(
    get,
    path = "/webhooks/instagram",
    params(
        ("hub.mode" = Option<String>, Query, description = "Must be 'subscribe'"),
        ("hub.verify_token" = Option<String>, Query, description = "Configured verification token"),
        ("hub.challenge" = Option<String>, Query, description = "Value echoed back on success")
    ),
    responses(
        (status = 200, description = "Challenge echoed as plain text", body = String),
        (status = 403, description = "Verification failed", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn verify_subscription(
    State(state): State<AppState>,
    Query(params): Query<HandshakeQuery>,
) -> Result<Response, ApiError> {
    let Some(configured_token) = state.config.webhook_verify_token.as_deref() else {
        warn!("Webhook verify token not configured; rejecting handshake");
        return Err(error::forbidden(Some("invalid verification request")));
    };

    let result = verify_handshake(
        params.mode.as_deref(),
        params.verify_token.as_deref(),
        configured_token,
    );

    match (result, params.challenge) {
        (Ok(()), Some(challenge)) => {
            info!("Webhook subscription verified");
            Ok(challenge.into_response())
        }
        (Ok(()), None) => {
            warn!("Handshake carried no challenge");
            Err(error::forbidden(Some("invalid verification request")))
        }
        (Err(e), _) => {
            warn!(error = %e, "Handshake verification failed");
            Err(error::forbidden(Some("invalid verification request")))
        }
    }
}

/// Inbound event delivery
///
/// The signature is verified over the exact raw bytes before anything else
/// happens. After verification, the body is parsed and normalized; per-event
/// processing either runs in the background worker (`queued` mode) or is
/// awaited before responding (`inline` mode, for per-request runtimes where
/// no code runs after the response).
#[utoipa::path(
    post,
    path = "/webhooks/instagram",
    params(
        ("X-Hub-Signature-256" = String, Header, description = "HMAC-SHA256 of the raw body, 'sha256=<hex>' or bare hex")
    ),
    request_body(content = JsonValue, description = "Platform delivery envelope", content_type = "application/json"),
    responses(
        (status = 200, description = "Delivery acknowledged", body = DeliveryAck),
        (status = 400, description = "Malformed JSON after a valid signature", body = ApiError),
        (status = 403, description = "Signature verification failed", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn receive_delivery(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<DeliveryAck>), ApiError> {
    counter!("dm_ingest_deliveries_received_total").increment(1);

    let Some(secret) = state.config.app_secret.as_deref() else {
        warn!("Webhook app secret not configured; rejecting delivery");
        return Err(error::forbidden(Some("invalid signature")));
    };

    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if let Err(e) = verify_delivery_signature(&body, signature, secret) {
        counter!("dm_ingest_deliveries_rejected_total").increment(1);
        warn!(error = %e, "Delivery signature verification failed");
        return Err(error::forbidden(Some("invalid signature")));
    }

    let envelope: WebhookEnvelope = serde_json::from_slice(&body).map_err(|e| {
        debug!(error = %e, "Delivery body is not valid JSON");
        error::bad_request("invalid JSON payload")
    })?;

    if envelope.object != OBJECT_INSTAGRAM {
        debug!(object = %envelope.object, "Ignoring delivery for unhandled object type");
        return Ok((StatusCode::OK, Json(DeliveryAck { ok: true })));
    }

    let events = normalization::normalize_envelope(&envelope, Utc::now());
    if events.is_empty() {
        return Ok((StatusCode::OK, Json(DeliveryAck { ok: true })));
    }

    info!(event_count = events.len(), "Accepted webhook delivery");

    match &state.ingest_tx {
        Some(tx) => {
            if let Err(send_err) = tx.try_send(DeliveryJob { events }) {
                // Queue full or worker gone: process inline rather than drop
                // an accepted delivery.
                warn!("Ingest queue unavailable, processing delivery inline");
                let job = match send_err {
                    tokio::sync::mpsc::error::TrySendError::Full(job)
                    | tokio::sync::mpsc::error::TrySendError::Closed(job) => job,
                };
                state.pipeline.process_delivery(job.events).await;
            }
        }
        None => state.pipeline.process_delivery(events).await,
    }

    Ok((StatusCode::OK, Json(DeliveryAck { ok: true })))
}
