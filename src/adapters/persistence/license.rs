use async_trait::async_trait;
use sqlx::postgres::Postgres;
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::ledger::{LicenseProfile, LicenseRepoTrait, NewLicense},
    domain::entities::license_status::LicenseStatus,
};

fn row_to_profile(row: sqlx::postgres::PgRow) -> LicenseProfile {
    LicenseProfile {
        license_id: row.get("license_id"),
        purchaser_email: row.get("purchaser_email"),
        tier: row.get("tier"),
        stack_group_id: row.get("stack_group_id"),
        checkout_session_id: row.get("checkout_session_id"),
        unit_index: row.get("unit_index"),
        status: row.get("status"),
        created_at: row.get("created_at"),
    }
}

const SELECT_COLS: &str = r#"
    license_id, purchaser_email, tier, stack_group_id, checkout_session_id,
    unit_index, status, created_at
"#;

#[async_trait]
impl LicenseRepoTrait for PostgresPersistence {
    async fn count_by_session(&self, checkout_session_id: &str) -> AppResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM licenses WHERE checkout_session_id = $1")
            .bind(checkout_session_id)
            .fetch_one(self.pool())
            .await
            .map_err(AppError::from)?;

        Ok(row.get("total"))
    }

    async fn insert_many(&self, licenses: &[NewLicense]) -> AppResult<u64> {
        if licenses.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "INSERT INTO licenses (license_id, purchaser_email, tier, stack_group_id, checkout_session_id, unit_index, status) ",
        );
        builder.push_values(licenses, |mut b, license| {
            b.push_bind(Uuid::new_v4())
                .push_bind(&license.purchaser_email)
                .push_bind(license.tier)
                .push_bind(license.stack_group_id)
                .push_bind(&license.checkout_session_id)
                .push_bind(license.unit_index)
                .push_bind(LicenseStatus::Active);
        });
        builder.push(" ON CONFLICT (checkout_session_id, unit_index) DO NOTHING");

        let result = builder
            .build()
            .execute(self.pool())
            .await
            .map_err(AppError::from)?;

        Ok(result.rows_affected())
    }

    async fn list_by_session(&self, checkout_session_id: &str) -> AppResult<Vec<LicenseProfile>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM licenses WHERE checkout_session_id = $1 ORDER BY unit_index",
            SELECT_COLS
        ))
        .bind(checkout_session_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(row_to_profile).collect())
    }
}
