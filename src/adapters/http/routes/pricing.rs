use axum::{Json, Router, extract::State, response::IntoResponse, routing::post};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    adapters::http::app_state::AppState,
    app_error::AppResult,
    domain::pricing::{
        InstallmentPlan, PricingQuote,
        money::{cents_to_dollars, format_usd},
    },
    use_cases::pricing::{CheckoutInput, QuoteInput},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PricingOptionsPayload {
    tier: String,
    #[serde(default)]
    referral_code: Option<String>,
    #[serde(default)]
    stack_count: Option<i64>,
    /// Accepted for parity with checkout; promo codes don't change the quote.
    #[serde(default)]
    #[allow(dead_code)]
    promo_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutPayload {
    tier: String,
    #[serde(default)]
    referral_code: Option<String>,
    #[serde(default)]
    stack_count: Option<i64>,
    #[serde(default)]
    installments: Option<u32>,
    #[serde(default)]
    promo_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OneTimeOption {
    total: f64,
    total_formatted: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InstallmentOption {
    installments: u32,
    fee_dollars: f64,
    fee_percent_effective: f64,
    per_payment_formatted: String,
    total_with_fee_formatted: String,
    approx_credits_per_payment: i64,
}

impl InstallmentOption {
    fn from_plan(plan: &InstallmentPlan, referral_extra_total: i64) -> Self {
        Self {
            installments: plan.installments,
            fee_dollars: cents_to_dollars(plan.fee_cents),
            fee_percent_effective: plan.fee_percent_effective(),
            per_payment_formatted: format_usd(plan.per_payment_cents),
            total_with_fee_formatted: format_usd(plan.gross_cents),
            approx_credits_per_payment: plan.approx_credits_per_payment(referral_extra_total),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PricingOptionsResponse {
    tier_label: &'static str,
    stack_count: u32,
    discount_pct: u32,
    one_time: OneTimeOption,
    installments: Vec<InstallmentOption>,
    base_credits: i64,
    bonus_credits: i64,
    referral_valid: bool,
    referral_code: Option<String>,
    referral_extra_per_unit: i64,
    referral_extra_total: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    banner_text: Option<String>,
}

impl PricingOptionsResponse {
    fn new(quote: PricingQuote, banner_text: Option<String>) -> Self {
        let installments = quote
            .installment_options
            .iter()
            .map(|plan| InstallmentOption::from_plan(plan, quote.referral_extra_total))
            .collect();

        Self {
            tier_label: quote.tier.catalog().label,
            stack_count: quote.stack_count,
            discount_pct: quote.discount_pct,
            one_time: OneTimeOption {
                total: cents_to_dollars(quote.one_time_total_cents),
                total_formatted: format_usd(quote.one_time_total_cents),
            },
            installments,
            base_credits: quote.base_credits,
            bonus_credits: quote.bonus_credits,
            referral_valid: quote.referral.valid,
            referral_code: quote.referral.code,
            referral_extra_per_unit: quote.referral_extra_per_unit,
            referral_extra_total: quote.referral_extra_total,
            banner_text,
        }
    }
}

#[derive(Debug, Serialize)]
struct CheckoutResponse {
    url: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pricing-options", post(pricing_options))
        .route("/create-checkout-session", post(create_checkout))
        .route("/create-plan-checkout", post(create_checkout))
}

async fn pricing_options(
    State(app_state): State<AppState>,
    Json(payload): Json<PricingOptionsPayload>,
) -> AppResult<impl IntoResponse> {
    let config = app_state.pricing_config.current();
    let input = QuoteInput {
        tier: payload.tier,
        referral_code: payload.referral_code,
        stack_count: payload.stack_count,
    };

    let quote = app_state
        .pricing_use_cases
        .quote(&input, &config, Utc::now())
        .await
        .map_err(|e| e.with_safe_message("could not calculate options"))?;

    Ok(Json(PricingOptionsResponse::new(
        quote,
        config.banner_text.clone(),
    )))
}

async fn create_checkout(
    State(app_state): State<AppState>,
    Json(payload): Json<CheckoutPayload>,
) -> AppResult<impl IntoResponse> {
    let config = app_state.pricing_config.current();
    let input = CheckoutInput {
        quote: QuoteInput {
            tier: payload.tier,
            referral_code: payload.referral_code,
            stack_count: payload.stack_count,
        },
        installments: payload.installments.unwrap_or(1),
        promo_code: payload.promo_code,
    };

    let session = app_state
        .pricing_use_cases
        .start_checkout(&input, &config, Utc::now())
        .await
        .map_err(|e| e.with_safe_message("could not start checkout"))?;

    Ok(Json(CheckoutResponse { url: session.url }))
}
