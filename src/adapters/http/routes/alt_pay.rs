use axum::{Json, Router, extract::State, response::IntoResponse, routing::post};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    adapters::http::app_state::AppState, app_error::AppResult, use_cases::alt_pay::AltPayInput,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AltPayPayload {
    #[serde(default)]
    tier: String,
    #[serde(default)]
    stack_count: Option<i64>,
    #[serde(default)]
    installments: Option<i64>,
    #[serde(default)]
    email: String,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default, rename = "other_method", alias = "otherMethod")]
    other_method: Option<String>,
    #[serde(default)]
    referral_code: Option<String>,
}

impl From<AltPayPayload> for AltPayInput {
    fn from(p: AltPayPayload) -> Self {
        Self {
            tier: p.tier,
            stack_count: p.stack_count,
            installments: p.installments,
            email: p.email,
            phone: p.phone,
            method: p.method,
            other_method: p.other_method,
            referral_code: p.referral_code,
        }
    }
}

#[derive(Debug, Serialize)]
struct AltPayResponse {
    ok: bool,
    reference: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/alt-pay-request", post(alt_pay_request))
}

async fn alt_pay_request(
    State(app_state): State<AppState>,
    Json(payload): Json<AltPayPayload>,
) -> AppResult<impl IntoResponse> {
    let request = app_state
        .alt_pay_use_cases
        .submit(&payload.into(), Utc::now())
        .await?;

    Ok(Json(AltPayResponse {
        ok: true,
        reference: request.reference,
    }))
}
