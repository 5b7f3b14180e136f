use async_trait::async_trait;
use sqlx::Row;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::ledger::{InstallmentPaymentProfile, InstallmentPaymentRepoTrait},
};

fn row_to_profile(row: sqlx::postgres::PgRow) -> InstallmentPaymentProfile {
    InstallmentPaymentProfile {
        invoice_id: row.get("invoice_id"),
        subscription_id: row.get("subscription_id"),
        amount_paid_cents: row.get("amount_paid_cents"),
        currency: row.get("currency"),
        paid_at: row.get("paid_at"),
    }
}

#[async_trait]
impl InstallmentPaymentRepoTrait for PostgresPersistence {
    async fn insert_if_absent(&self, payment: &InstallmentPaymentProfile) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO installment_payments (invoice_id, subscription_id, amount_paid_cents, currency, paid_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (invoice_id) DO NOTHING
            "#,
        )
        .bind(&payment.invoice_id)
        .bind(&payment.subscription_id)
        .bind(payment.amount_paid_cents)
        .bind(&payment.currency)
        .bind(payment.paid_at)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_by_subscription(&self, subscription_id: &str) -> AppResult<Vec<InstallmentPaymentProfile>> {
        let rows = sqlx::query(
            r#"
            SELECT invoice_id, subscription_id, amount_paid_cents, currency, paid_at
            FROM installment_payments
            WHERE subscription_id = $1
            ORDER BY paid_at
            "#,
        )
        .bind(subscription_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_profile).collect())
    }
}
