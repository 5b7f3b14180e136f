use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::referral::{
        NewRedemption, RedemptionProfile, RedemptionRepoTrait, RedemptionWrite,
    },
};

fn row_to_profile(row: sqlx::postgres::PgRow) -> RedemptionProfile {
    RedemptionProfile {
        id: row.get("id"),
        code: row.get("code"),
        owner_email: row.get("owner_email"),
        purchaser_email: row.get("purchaser_email"),
        tier_purchased: row.get("tier_purchased"),
        credit_value: row.get("credit_value"),
        checkout_session_id: row.get("checkout_session_id"),
        discount_pct_applied: row.get("discount_pct_applied"),
        source: row.get("source"),
        redeemed_ts: row.get("redeemed_ts"),
    }
}

const SELECT_COLS: &str = r#"
    id, code, owner_email, purchaser_email, tier_purchased, credit_value,
    checkout_session_id, discount_pct_applied, source, redeemed_ts
"#;

#[async_trait]
impl RedemptionRepoTrait for PostgresPersistence {
    async fn exists_for_session(&self, checkout_session_id: &str) -> AppResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM redemptions WHERE checkout_session_id = $1) AS present",
        )
        .bind(checkout_session_id)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.get("present"))
    }

    async fn redeem_code(&self, input: &NewRedemption) -> AppResult<RedemptionWrite> {
        // Dropping the transaction on any early return rolls the claim back.
        let mut tx = self.pool().begin().await.map_err(AppError::from)?;

        let claimed = sqlx::query(
            r#"
            UPDATE referral_codes
            SET use_count = use_count + 1,
                used_by_email = $2,
                used_at = $3,
                status = CASE
                    WHEN use_count + 1 >= max_uses THEN 'used'::referral_status
                    ELSE status
                END
            WHERE code = $1 AND status = 'issued' AND use_count < max_uses
            RETURNING owner_email
            "#,
        )
        .bind(&input.code)
        .bind(&input.purchaser_email)
        .bind(input.redeemed_ts)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?;
        let Some(claimed) = claimed else {
            return Ok(RedemptionWrite::Unclaimable);
        };
        let owner_email: String = claimed.get("owner_email");

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO redemptions (
                id, code, owner_email, purchaser_email, tier_purchased, credit_value,
                checkout_session_id, discount_pct_applied, source, redeemed_ts
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (checkout_session_id) DO NOTHING
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(Uuid::new_v4())
        .bind(&input.code)
        .bind(&owner_email)
        .bind(&input.purchaser_email)
        .bind(input.tier_purchased)
        .bind(input.credit_value)
        .bind(&input.checkout_session_id)
        .bind(input.discount_pct_applied)
        .bind(input.source)
        .bind(input.redeemed_ts)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::from)?;
        let Some(inserted) = inserted else {
            return Ok(RedemptionWrite::SessionTaken);
        };

        sqlx::query(
            r#"
            INSERT INTO referral_owners (owner_email, total_codes_issued, total_redemptions, credits_earned)
            VALUES ($1, 0, 1, $2)
            ON CONFLICT (owner_email) DO UPDATE SET
                total_redemptions = referral_owners.total_redemptions + 1,
                credits_earned = referral_owners.credits_earned + EXCLUDED.credits_earned,
                updated_at = now()
            "#,
        )
        .bind(&owner_email)
        .bind(input.owner_credits.max(0))
        .execute(&mut *tx)
        .await
        .map_err(AppError::from)?;

        tx.commit().await.map_err(AppError::from)?;
        Ok(RedemptionWrite::Recorded(row_to_profile(inserted)))
    }

    async fn count_for_code(&self, code: &str) -> AppResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM redemptions WHERE code = $1")
            .bind(code)
            .fetch_one(self.pool())
            .await
            .map_err(AppError::from)?;

        Ok(row.get("total"))
    }

    async fn list_for_owner(&self, owner_email: &str) -> AppResult<Vec<RedemptionProfile>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM redemptions
            WHERE owner_email = $1
            ORDER BY redeemed_ts DESC
            "#,
            SELECT_COLS
        ))
        .bind(owner_email)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_profile).collect())
    }
}
