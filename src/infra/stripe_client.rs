use std::collections::HashMap;

use chrono::{DateTime, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::app_error::{AppError, AppResult};
use crate::application::checkout::MetadataMap;
use crate::application::use_cases::reconciliation::{CheckoutCompletion, InvoicePayment};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

pub type FormParams = Vec<(String, String)>;

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            api_base: STRIPE_API_BASE.to_string(),
        }
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", self.secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    // ========================================================================
    // Checkout Sessions
    // ========================================================================

    pub async fn create_checkout_session(&self, params: &FormParams) -> AppResult<StripeCheckoutSession> {
        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.api_base))
            .header("Authorization", self.auth_header())
            .form(params)
            .send()
            .await
            .map_err(request_failed)?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    pub async fn get_subscription(&self, subscription_id: &str) -> AppResult<StripeSubscription> {
        let response = self
            .client
            .get(format!("{}/subscriptions/{}", self.api_base, subscription_id))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(request_failed)?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Subscription Schedules
    // ========================================================================

    pub async fn get_subscription_schedule(&self, schedule_id: &str) -> AppResult<StripeSubscriptionSchedule> {
        let response = self
            .client
            .get(format!("{}/subscription_schedules/{}", self.api_base, schedule_id))
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(request_failed)?;

        self.handle_response(response).await
    }

    pub async fn create_schedule_from_subscription(
        &self,
        subscription_id: &str,
    ) -> AppResult<StripeSubscriptionSchedule> {
        let response = self
            .client
            .post(format!("{}/subscription_schedules", self.api_base))
            .header("Authorization", self.auth_header())
            .form(&[("from_subscription", subscription_id)])
            .send()
            .await
            .map_err(request_failed)?;

        self.handle_response(response).await
    }

    pub async fn update_subscription_schedule(
        &self,
        schedule_id: &str,
        params: &FormParams,
    ) -> AppResult<StripeSubscriptionSchedule> {
        let response = self
            .client
            .post(format!("{}/subscription_schedules/{}", self.api_base, schedule_id))
            .header("Authorization", self.auth_header())
            .form(params)
            .send()
            .await
            .map_err(request_failed)?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Webhook Signature Verification
    // ========================================================================

    pub fn verify_webhook_signature(
        payload: &str,
        signature_header: &str,
        webhook_secret: &str,
    ) -> AppResult<()> {
        Self::verify_webhook_signature_at(
            payload,
            signature_header,
            webhook_secret,
            Utc::now().timestamp(),
        )
    }

    pub fn verify_webhook_signature_at(
        payload: &str,
        signature_header: &str,
        webhook_secret: &str,
        now: i64,
    ) -> AppResult<()> {
        // Header format: "t=timestamp,v1=signature,..."
        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature_header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| AppError::SignatureInvalid("missing timestamp".into()))?;
        if signatures.is_empty() {
            return Err(AppError::SignatureInvalid("missing v1 signature".into()));
        }

        let expected = sign_payload(timestamp, payload, webhook_secret)?;
        if !signatures.iter().any(|sig| constant_time_compare(sig, &expected)) {
            return Err(AppError::SignatureInvalid("signature mismatch".into()));
        }

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| AppError::SignatureInvalid("invalid timestamp".into()))?;
        if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
            return Err(AppError::SignatureInvalid("timestamp outside tolerance".into()));
        }
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("Failed to read Stripe response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Stripe API error");

            if let Ok(error) = serde_json::from_str::<StripeErrorResponse>(&body) {
                return Err(AppError::UpstreamUnavailable(format!(
                    "Stripe error: {}",
                    error.error.message.unwrap_or(error.error.error_type)
                )));
            }

            return Err(AppError::UpstreamUnavailable(format!(
                "Stripe API error: {}",
                status
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse Stripe response");
            AppError::Internal(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

fn request_failed(err: reqwest::Error) -> AppError {
    AppError::UpstreamUnavailable(format!("Stripe request failed: {}", err))
}

/// Hex HMAC-SHA256 of "{timestamp}.{payload}".
pub fn sign_payload(timestamp: &str, payload: &str, webhook_secret: &str) -> AppResult<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let mut mac = Hmac::<Sha256>::new_from_slice(webhook_secret.as_bytes())
        .map_err(|_| AppError::Internal("HMAC error".into()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

fn timestamp_to_datetime(ts: Option<i64>) -> DateTime<Utc> {
    ts.and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_else(Utc::now)
}

// ============================================================================
// Stripe Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StripeCustomerDetails {
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub customer: Option<String>,
    pub customer_email: Option<String>,
    pub customer_details: Option<StripeCustomerDetails>,
    pub subscription: Option<String>,
    pub payment_intent: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created: Option<i64>,
}

impl StripeCheckoutSession {
    pub fn into_completion(self) -> CheckoutCompletion {
        let details = self.customer_details;
        let (email, customer_name, phone) = match details {
            Some(d) => (d.email, d.name, d.phone),
            None => (None, None, None),
        };

        CheckoutCompletion {
            session_id: self.id,
            subscription_id: self.subscription,
            payment_intent_id: self.payment_intent,
            customer_id: self.customer,
            email: email.or(self.customer_email),
            customer_name,
            phone,
            amount_total_cents: self.amount_total,
            currency: self.currency,
            metadata: self.metadata,
            completed_at: timestamp_to_datetime(self.created),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub schedule: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub items: StripeSubscriptionItems,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionItems {
    pub data: Vec<StripeSubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionItem {
    pub id: String,
    pub price: StripePriceRef,
    pub quantity: Option<u64>,
}

/// Prices come back as an id or as an expanded object depending on the endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StripePriceRef {
    Id(String),
    Object { id: String },
}

impl StripePriceRef {
    pub fn id(&self) -> &str {
        match self {
            StripePriceRef::Id(id) | StripePriceRef::Object { id } => id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeSubscriptionSchedule {
    pub id: String,
    pub end_behavior: Option<String>,
    #[serde(default)]
    pub phases: Vec<StripeSchedulePhase>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSchedulePhase {
    pub start_date: i64,
    pub end_date: Option<i64>,
    #[serde(default)]
    pub items: Vec<StripeSchedulePhaseItem>,
}

#[derive(Debug, Deserialize)]
pub struct StripeSchedulePhaseItem {
    pub price: StripePriceRef,
    pub quantity: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StripeSubscriptionDetails {
    pub subscription: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StripeInvoiceParent {
    pub subscription_details: Option<StripeSubscriptionDetails>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StripeStatusTransitions {
    pub paid_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    pub subscription: Option<String>,
    pub subscription_details: Option<StripeSubscriptionDetails>,
    pub parent: Option<StripeInvoiceParent>,
    pub customer_email: Option<String>,
    #[serde(default)]
    pub amount_paid: i64,
    pub currency: Option<String>,
    pub status_transitions: Option<StripeStatusTransitions>,
    pub created: Option<i64>,
}

impl StripeInvoice {
    pub fn into_payment(self) -> InvoicePayment {
        // Newer API versions moved subscription details under `parent`.
        let nested = self.parent.and_then(|p| p.subscription_details);
        let subscription_id = self
            .subscription
            .or_else(|| nested.as_ref().and_then(|d| d.subscription.clone()));
        let subscription_metadata: MetadataMap = nested
            .map(|d| d.metadata)
            .filter(|m| !m.is_empty())
            .or_else(|| self.subscription_details.map(|d| d.metadata))
            .unwrap_or_default();
        let paid_at = self
            .status_transitions
            .and_then(|t| t.paid_at)
            .or(self.created);

        InvoicePayment {
            invoice_id: self.id,
            subscription_id,
            customer_email: self.customer_email,
            amount_paid_cents: self.amount_paid,
            currency: self.currency,
            subscription_metadata,
            paid_at: timestamp_to_datetime(paid_at),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StripeErrorResponse {
    pub error: StripeError,
}

#[derive(Debug, Deserialize)]
pub struct StripeError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: Option<String>,
    pub code: Option<String>,
}

// ============================================================================
// Webhook Event Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeWebhookEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeWebhookEventData {
    pub object: serde_json::Value,
}

impl StripeWebhookEvent {
    pub fn get_checkout_session(&self) -> Option<StripeCheckoutSession> {
        serde_json::from_value(self.data.object.clone()).ok()
    }

    pub fn get_invoice(&self) -> Option<StripeInvoice> {
        serde_json::from_value(self.data.object.clone()).ok()
    }
}
