use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
};
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    infra::stripe_client::{StripeClient, StripeWebhookEvent},
    use_cases::reconciliation::Acceptance,
};

const SIGNATURE_HEADER: &str = "stripe-signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(stripe_webhook))
}

/// Verifies and acknowledges provider events. Reconciliation runs in the
/// background, so the reply never waits on it.
async fn stripe_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<impl IntoResponse> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::SignatureInvalid("missing Stripe-Signature header".into()))?;

    StripeClient::verify_webhook_signature(
        &body,
        signature,
        app_state.config.stripe_webhook_secret.expose_secret(),
    )?;

    let event: StripeWebhookEvent = serde_json::from_str(&body)
        .map_err(|e| AppError::InvalidInput(format!("Malformed event: {e}")))?;

    match event.event_type.as_str() {
        "checkout.session.completed" => match event.get_checkout_session() {
            Some(session) => {
                let acceptance = app_state
                    .reconciler
                    .accept_checkout_completed(session.into_completion());
                log_acceptance(&event.id, &event.event_type, acceptance);
            }
            None => warn!(event_id = %event.id, "Checkout event without a session object"),
        },
        "invoice.paid" => match event.get_invoice() {
            Some(invoice) => {
                let acceptance = app_state.reconciler.accept_invoice_paid(invoice.into_payment());
                log_acceptance(&event.id, &event.event_type, acceptance);
            }
            None => warn!(event_id = %event.id, "Invoice event without an invoice object"),
        },
        other => debug!(event_id = %event.id, event_type = other, "Ignoring webhook event"),
    }

    Ok(Json(json!({ "received": true })))
}

fn log_acceptance(event_id: &str, event_type: &str, acceptance: Acceptance) {
    match acceptance {
        Acceptance::Started => info!(event_id, event_type, "Webhook accepted"),
        Acceptance::AlreadyInFlight | Acceptance::AlreadyDone => {
            info!(event_id, event_type, ?acceptance, "Duplicate webhook acknowledged")
        }
    }
}
