use async_trait::async_trait;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::alt_pay::{AltPayRepoTrait, AltPayRequestProfile},
};

#[async_trait]
impl AltPayRepoTrait for PostgresPersistence {
    async fn insert_if_absent(&self, request: &AltPayRequestProfile) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO alt_pay_requests (
                reference, tier, stack_count, installments, email, phone,
                method, other_method, referral_code, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (reference) DO NOTHING
            "#,
        )
        .bind(&request.reference)
        .bind(request.tier)
        .bind(request.stack_count)
        .bind(request.installments)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(&request.method)
        .bind(&request.other_method)
        .bind(&request.referral_code)
        .bind(request.created_at)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected() == 1)
    }
}
