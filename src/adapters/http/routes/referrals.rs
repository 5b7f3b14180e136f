use axum::{
    Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    adapters::http::app_state::AppState,
    app_error::AppResult,
    domain::entities::tier::Tier,
    use_cases::referral::RedemptionProfile,
};

#[derive(Debug, Deserialize)]
struct CheckCodePayload {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckCodeResponse {
    valid: bool,
    owner_email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratePayload {
    #[serde(default)]
    owner_email: String,
}

#[derive(Debug, Serialize)]
struct GenerateResponse {
    code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedeemAfterPayload {
    #[serde(default)]
    code: String,
    #[serde(default)]
    purchaser_email: String,
}

#[derive(Debug, Serialize)]
struct RedeemAfterResponse {
    ok: bool,
    credit_value: i64,
    discount_refund_due: i32,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    email: String,
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    code: String,
    purchaser_email: String,
    tier_purchased: Tier,
    credit_value: i64,
    redeemed_ts: DateTime<Utc>,
}

impl From<RedemptionProfile> for HistoryEntry {
    fn from(r: RedemptionProfile) -> Self {
        Self {
            code: r.code,
            purchaser_email: r.purchaser_email,
            tier_purchased: r.tier_purchased,
            credit_value: r.credit_value,
            redeemed_ts: r.redeemed_ts,
        }
    }
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    total_redemptions: i64,
    credits_earned: i64,
    redemptions: Vec<HistoryEntry>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/check-code", post(check_code))
        .route("/referrals/generate", post(generate))
        .route("/referrals/redeem-after", post(redeem_after))
        .route("/referrals/history", get(history))
}

/// Never fails: an unreachable store reads as an invalid code.
async fn check_code(
    State(app_state): State<AppState>,
    Json(payload): Json<CheckCodePayload>,
) -> impl IntoResponse {
    let decision = match app_state
        .referral_use_cases
        .validate(payload.code.as_deref())
        .await
    {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!(error = %e, "Referral lookup failed");
            Default::default()
        }
    };

    Json(CheckCodeResponse {
        valid: decision.valid,
        owner_email: decision.owner_email.unwrap_or_default(),
    })
}

async fn generate(
    State(app_state): State<AppState>,
    Json(payload): Json<GeneratePayload>,
) -> AppResult<impl IntoResponse> {
    let today = Utc::now().date_naive();
    let code = app_state
        .referral_use_cases
        .issue(&payload.owner_email, today)
        .await?;
    Ok(Json(GenerateResponse { code: code.code }))
}

async fn redeem_after(
    State(app_state): State<AppState>,
    Json(payload): Json<RedeemAfterPayload>,
) -> AppResult<impl IntoResponse> {
    let config = app_state.pricing_config.current();
    let outcome = app_state
        .referral_use_cases
        .redeem_after(
            &payload.code,
            &payload.purchaser_email,
            &config.referral,
            Utc::now(),
        )
        .await?;

    Ok(Json(RedeemAfterResponse {
        ok: true,
        credit_value: outcome.credit_value,
        discount_refund_due: outcome.discount_refund_due,
    }))
}

async fn history(
    State(app_state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> AppResult<impl IntoResponse> {
    let history = app_state.referral_use_cases.history(&query.email).await?;
    Ok(Json(HistoryResponse {
        total_redemptions: history.total_redemptions,
        credits_earned: history.credits_earned,
        redemptions: history.redemptions.into_iter().map(HistoryEntry::from).collect(),
    }))
}
