use async_trait::async_trait;
use sqlx::Row;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::ledger::{CreditLedgerEntry, CreditLedgerRepoTrait},
    domain::entities::credit_role::CreditRole,
};

fn row_to_entry(row: sqlx::postgres::PgRow) -> CreditLedgerEntry {
    CreditLedgerEntry {
        subscription_id: row.get("subscription_id"),
        invoice_id: row.get("invoice_id"),
        installment_index: row.get("installment_index"),
        recipient_email: row.get("recipient_email"),
        amount: row.get("amount"),
        role: row.get("role"),
        created_at: row.get("created_at"),
    }
}

const SELECT_COLS: &str =
    "subscription_id, invoice_id, installment_index, recipient_email, amount, role, created_at";

#[async_trait]
impl CreditLedgerRepoTrait for PostgresPersistence {
    async fn count_by_role(&self, subscription_id: &str, role: CreditRole) -> AppResult<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total FROM credit_ledger WHERE subscription_id = $1 AND role = $2",
        )
        .bind(subscription_id)
        .bind(role)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.get("total"))
    }

    async fn find_by_invoice(&self, invoice_id: &str, role: CreditRole) -> AppResult<Option<CreditLedgerEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM credit_ledger WHERE invoice_id = $1 AND role = $2",
            SELECT_COLS
        ))
        .bind(invoice_id)
        .bind(role)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_entry))
    }

    async fn insert_if_absent(&self, entry: &CreditLedgerEntry) -> AppResult<bool> {
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        let result = sqlx::query(
            r#"
            INSERT INTO credit_ledger (
                subscription_id, invoice_id, installment_index, recipient_email, amount, role, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&entry.subscription_id)
        .bind(&entry.invoice_id)
        .bind(entry.installment_index)
        .bind(&entry.recipient_email)
        .bind(entry.amount)
        .bind(entry.role)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        if entry.role == CreditRole::Referrer {
            sqlx::query(
                r#"
                INSERT INTO referral_owners (owner_email, total_codes_issued, total_redemptions, credits_earned)
                VALUES ($1, 0, 0, $2)
                ON CONFLICT (owner_email) DO UPDATE SET
                    credits_earned = referral_owners.credits_earned + EXCLUDED.credits_earned,
                    updated_at = now()
                "#,
            )
            .bind(&entry.recipient_email)
            .bind(entry.amount.max(0))
            .execute(&mut *tx)
            .await
            .map_err(AppError::from)?;
        }

        tx.commit().await.map_err(AppError::from)?;
        Ok(true)
    }

    async fn list_by_subscription(&self, subscription_id: &str) -> AppResult<Vec<CreditLedgerEntry>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM credit_ledger
            WHERE subscription_id = $1
            ORDER BY installment_index, role
            "#,
            SELECT_COLS
        ))
        .bind(subscription_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_entry).collect())
    }
}
