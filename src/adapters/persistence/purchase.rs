use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::ledger::{NewPurchase, PurchaseProfile, PurchaseRepoTrait},
};

fn row_to_profile(row: sqlx::postgres::PgRow) -> PurchaseProfile {
    PurchaseProfile {
        id: row.get("id"),
        checkout_session_id: row.get("checkout_session_id"),
        subscription_id: row.get("subscription_id"),
        email: row.get("email"),
        tier: row.get("tier"),
        stack_count: row.get("stack_count"),
        installments: row.get("installments"),
        plan_total_cents: row.get("plan_total_cents"),
        discount_pct: row.get("discount_pct"),
        base_credits: row.get("base_credits"),
        bonus_credits: row.get("bonus_credits"),
        referral_extra: row.get("referral_extra"),
        referral_code_used: row.get("referral_code_used"),
        referral_owner_email: row.get("referral_owner_email"),
        payment_intent_id: row.get("payment_intent_id"),
        customer_id: row.get("customer_id"),
        customer_name: row.get("customer_name"),
        phone: row.get("phone"),
        currency: row.get("currency"),
        status: row.get("status"),
        purchased_at: row.get("purchased_at"),
    }
}

const SELECT_COLS: &str = r#"
    id, checkout_session_id, subscription_id, email, tier, stack_count, installments,
    plan_total_cents, discount_pct, base_credits, bonus_credits, referral_extra,
    referral_code_used, referral_owner_email, payment_intent_id, customer_id,
    customer_name, phone, currency, status, purchased_at
"#;

#[async_trait]
impl PurchaseRepoTrait for PostgresPersistence {
    async fn insert_if_absent(&self, input: &NewPurchase) -> AppResult<(PurchaseProfile, bool)> {
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO purchases (
                id, checkout_session_id, subscription_id, email, tier, stack_count, installments,
                plan_total_cents, discount_pct, base_credits, bonus_credits, referral_extra,
                referral_code_used, referral_owner_email, payment_intent_id, customer_id,
                customer_name, phone, currency, status, purchased_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)
            ON CONFLICT (checkout_session_id) DO NOTHING
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(&input.checkout_session_id)
        .bind(&input.subscription_id)
        .bind(&input.email)
        .bind(input.tier)
        .bind(input.stack_count)
        .bind(input.installments)
        .bind(input.plan_total_cents)
        .bind(input.discount_pct)
        .bind(input.base_credits)
        .bind(input.bonus_credits)
        .bind(input.referral_extra)
        .bind(&input.referral_code_used)
        .bind(&input.referral_owner_email)
        .bind(&input.payment_intent_id)
        .bind(&input.customer_id)
        .bind(&input.customer_name)
        .bind(&input.phone)
        .bind(&input.currency)
        .bind(input.status)
        .bind(input.purchased_at)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        if let Some(row) = inserted {
            return Ok((row_to_profile(row), true));
        }

        let existing = self
            .get_by_session(&input.checkout_session_id)
            .await?
            .ok_or(AppError::NotFound)?;
        Ok((existing, false))
    }

    async fn get_by_session(&self, checkout_session_id: &str) -> AppResult<Option<PurchaseProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM purchases WHERE checkout_session_id = $1",
            SELECT_COLS
        ))
        .bind(checkout_session_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }

    async fn get_by_subscription(&self, subscription_id: &str) -> AppResult<Option<PurchaseProfile>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM purchases
            WHERE subscription_id = $1
            ORDER BY purchased_at DESC
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(subscription_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }

    async fn latest_by_email(&self, email: &str) -> AppResult<Option<PurchaseProfile>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM purchases
            WHERE email = $1
            ORDER BY purchased_at DESC
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(email)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }
}
