use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::Row;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::referral::{
        CodeInsert, NewReferralCode, OwnerDelta, ReferralCodeProfile, ReferralCodeRepoTrait,
        ReferralOwnerProfile,
    },
};

fn row_to_profile(row: sqlx::postgres::PgRow) -> ReferralCodeProfile {
    ReferralCodeProfile {
        code: row.get("code"),
        owner_email: row.get("owner_email"),
        issued_date: row.get("issued_date"),
        status: row.get("status"),
        used_by_email: row.get("used_by_email"),
        used_at: row.get("used_at"),
        max_uses: row.get("max_uses"),
        use_count: row.get("use_count"),
        created_at: row.get("created_at"),
    }
}

fn row_to_owner(row: sqlx::postgres::PgRow) -> ReferralOwnerProfile {
    ReferralOwnerProfile {
        owner_email: row.get("owner_email"),
        total_codes_issued: row.get("total_codes_issued"),
        total_redemptions: row.get("total_redemptions"),
        credits_earned: row.get("credits_earned"),
    }
}

const SELECT_COLS: &str = r#"
    code, owner_email, issued_date, status, used_by_email, used_at,
    max_uses, use_count, created_at
"#;

const OWNER_COLS: &str = "owner_email, total_codes_issued, total_redemptions, credits_earned";

#[async_trait]
impl ReferralCodeRepoTrait for PostgresPersistence {
    async fn find_code(&self, code: &str) -> AppResult<Option<ReferralCodeProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM referral_codes WHERE code = $1",
            SELECT_COLS
        ))
        .bind(code)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }

    async fn find_for_owner_on(&self, owner_email: &str, day: NaiveDate) -> AppResult<Option<ReferralCodeProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM referral_codes WHERE owner_email = $1 AND issued_date = $2",
            SELECT_COLS
        ))
        .bind(owner_email)
        .bind(day)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_profile))
    }

    async fn insert_code_if_absent(&self, input: &NewReferralCode) -> AppResult<CodeInsert> {
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO referral_codes (code, owner_email, issued_date, status, max_uses)
            VALUES ($1, $2, $3, 'issued', $4)
            ON CONFLICT DO NOTHING
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(&input.code)
        .bind(&input.owner_email)
        .bind(input.issued_date)
        .bind(input.max_uses)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        if let Some(row) = inserted {
            return Ok(CodeInsert::Created(row_to_profile(row)));
        }

        // Either the owner already has today's code or the code itself is taken.
        match self
            .find_for_owner_on(&input.owner_email, input.issued_date)
            .await?
        {
            Some(existing) => Ok(CodeInsert::Existing(existing)),
            None => Ok(CodeInsert::CodeTaken),
        }
    }

    async fn get_owner(&self, owner_email: &str) -> AppResult<Option<ReferralOwnerProfile>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM referral_owners WHERE owner_email = $1",
            OWNER_COLS
        ))
        .bind(owner_email)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(row_to_owner))
    }

    async fn bump_owner(&self, owner_email: &str, delta: OwnerDelta) -> AppResult<ReferralOwnerProfile> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO referral_owners (owner_email, total_codes_issued, total_redemptions, credits_earned)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (owner_email) DO UPDATE SET
                total_codes_issued = referral_owners.total_codes_issued + EXCLUDED.total_codes_issued,
                total_redemptions = referral_owners.total_redemptions + EXCLUDED.total_redemptions,
                credits_earned = referral_owners.credits_earned + EXCLUDED.credits_earned,
                updated_at = now()
            RETURNING {}
            "#,
            OWNER_COLS
        ))
        .bind(owner_email)
        .bind(delta.codes_issued.max(0))
        .bind(delta.redemptions.max(0))
        .bind(delta.credits.max(0))
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row_to_owner(row))
    }
}
