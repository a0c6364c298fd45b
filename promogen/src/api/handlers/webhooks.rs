//! Identity provider webhook endpoint.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::{
    AppState,
    api::models::MessageResponse,
    errors::{Error, Result},
    webhooks::{
        apply_event,
        events::{IdentityEvent, WebhookEnvelope},
        signing::verify_request,
    },
};

#[utoipa::path(
    post,
    path = "/clerk",
    tag = "webhooks",
    summary = "Identity provider events",
    description = "Receives Svix-signed events from the identity provider: `user.created`, `user.deleted` and \
        `paymentAttempt.updated`. Other event types are acknowledged and ignored.",
    request_body(content = WebhookEnvelope, content_type = "application/json"),
    responses(
        (status = 200, description = "Event processed", body = MessageResponse),
        (status = 400, description = "Invalid signature, malformed payload, or unknown plan", body = crate::errors::ErrorBody),
        (status = 404, description = "Paying user not found", body = crate::errors::ErrorBody),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorBody),
    )
)]
#[instrument(skip_all)]
pub async fn identity_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<MessageResponse>> {
    let Some(secret) = state.config.webhooks.signing_secret.as_deref() else {
        error!("Identity webhook called but webhooks.signing_secret is not configured");
        return Err(Error::Internal {
            operation: "verify webhook: no signing secret configured".to_string(),
        });
    };

    // Signatures cover the exact bytes sent, so verify before parsing
    let payload = std::str::from_utf8(&body).map_err(|_| Error::BadRequest {
        message: "Webhook body must be UTF-8".to_string(),
    })?;
    verify_request(&headers, payload, secret, state.config.webhooks.tolerance, Utc::now()).map_err(|e| {
        warn!("Rejected webhook: {e}");
        Error::BadRequest {
            message: "Invalid webhook signature".to_string(),
        }
    })?;

    let envelope: WebhookEnvelope = serde_json::from_str(payload).map_err(|e| Error::BadRequest {
        message: format!("Invalid webhook payload: {e}"),
    })?;
    let event_type = envelope.event_type.clone();
    info!(%event_type, "Received webhook event");

    let event = IdentityEvent::from_envelope(envelope).map_err(|e| Error::BadRequest {
        message: format!("Invalid {event_type} payload: {e}"),
    })?;
    apply_event(&state.store, &state.config.credits, event).await?;

    Ok(Json(MessageResponse::new(format!("Webhook Received: {event_type}"))))
}
