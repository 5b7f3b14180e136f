pub mod alt_pay;
pub mod health;
pub mod pricing;
pub mod referrals;
pub mod webhook;

use axum::Router;

use crate::adapters::http::app_state::AppState;

/// Routes served under `/api`.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(pricing::router())
        .merge(referrals::router())
        .merge(alt_pay::router())
        .merge(webhook::router())
}

/// Routes served at the site root.
pub fn root_router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(webhook::router())
}
