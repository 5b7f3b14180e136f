//! In-memory mock implementations for referral repository traits.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::referral::{
        CodeInsert, NewRedemption, NewReferralCode, OwnerDelta, RedemptionProfile,
        RedemptionRepoTrait, RedemptionWrite, ReferralCodeProfile, ReferralCodeRepoTrait,
        ReferralOwnerProfile,
    },
    domain::entities::referral_status::ReferralStatus,
};

// ============================================================================
// InMemoryReferralCodeRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryReferralCodeRepo {
    pub codes: Mutex<HashMap<String, ReferralCodeProfile>>,
    pub owners: Mutex<HashMap<String, ReferralOwnerProfile>>,
}

impl InMemoryReferralCodeRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_codes(codes: Vec<ReferralCodeProfile>) -> Self {
        let repo = Self::new();
        for code in codes {
            repo.add(code);
        }
        repo
    }

    pub fn add(&self, code: ReferralCodeProfile) {
        self.codes.lock().unwrap().insert(code.code.clone(), code);
    }
}

#[async_trait]
impl ReferralCodeRepoTrait for InMemoryReferralCodeRepo {
    async fn find_code(&self, code: &str) -> AppResult<Option<ReferralCodeProfile>> {
        Ok(self.codes.lock().unwrap().get(code).cloned())
    }

    async fn find_for_owner_on(
        &self,
        owner_email: &str,
        day: NaiveDate,
    ) -> AppResult<Option<ReferralCodeProfile>> {
        Ok(self
            .codes
            .lock()
            .unwrap()
            .values()
            .find(|c| c.owner_email == owner_email && c.issued_date == day)
            .cloned())
    }

    async fn insert_code_if_absent(&self, input: &NewReferralCode) -> AppResult<CodeInsert> {
        let mut codes = self.codes.lock().unwrap();

        if let Some(existing) = codes
            .values()
            .find(|c| c.owner_email == input.owner_email && c.issued_date == input.issued_date)
        {
            return Ok(CodeInsert::Existing(existing.clone()));
        }
        if codes.contains_key(&input.code) {
            return Ok(CodeInsert::CodeTaken);
        }

        let created = ReferralCodeProfile {
            code: input.code.clone(),
            owner_email: input.owner_email.clone(),
            issued_date: input.issued_date,
            status: ReferralStatus::Issued,
            used_by_email: None,
            used_at: None,
            max_uses: input.max_uses,
            use_count: 0,
            created_at: Utc::now(),
        };
        codes.insert(created.code.clone(), created.clone());
        Ok(CodeInsert::Created(created))
    }

    async fn get_owner(&self, owner_email: &str) -> AppResult<Option<ReferralOwnerProfile>> {
        Ok(self.owners.lock().unwrap().get(owner_email).cloned())
    }

    async fn bump_owner(
        &self,
        owner_email: &str,
        delta: OwnerDelta,
    ) -> AppResult<ReferralOwnerProfile> {
        let mut owners = self.owners.lock().unwrap();
        let owner = owners
            .entry(owner_email.to_string())
            .or_insert_with(|| ReferralOwnerProfile {
                owner_email: owner_email.to_string(),
                ..Default::default()
            });
        owner.total_codes_issued += delta.codes_issued;
        owner.total_redemptions += delta.redemptions;
        owner.credits_earned += delta.credits;
        Ok(owner.clone())
    }
}

// ============================================================================
// InMemoryRedemptionRepo
// ============================================================================

/// Shares the code repo so `redeem_code` can claim, insert and bump as one
/// unit under both locks.
pub struct InMemoryRedemptionRepo {
    pub redemptions: Mutex<Vec<RedemptionProfile>>,
    codes: Arc<InMemoryReferralCodeRepo>,
    /// The next `redeem_code` fails before writing anything.
    fail_next: AtomicBool,
}

impl InMemoryRedemptionRepo {
    pub fn new(codes: Arc<InMemoryReferralCodeRepo>) -> Self {
        Self {
            redemptions: Mutex::new(Vec::new()),
            codes,
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn fail_next_redeem(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RedemptionRepoTrait for InMemoryRedemptionRepo {
    async fn exists_for_session(&self, checkout_session_id: &str) -> AppResult<bool> {
        Ok(self
            .redemptions
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.checkout_session_id == checkout_session_id))
    }

    async fn redeem_code(&self, input: &NewRedemption) -> AppResult<RedemptionWrite> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AppError::Database("redemption store unavailable".into()));
        }

        let mut redemptions = self.redemptions.lock().unwrap();
        let mut codes = self.codes.codes.lock().unwrap();
        let Some(stored) = codes.get_mut(&input.code) else {
            return Ok(RedemptionWrite::Unclaimable);
        };
        if !stored.status.is_redeemable() || stored.use_count >= stored.max_uses {
            return Ok(RedemptionWrite::Unclaimable);
        }
        if redemptions
            .iter()
            .any(|r| r.checkout_session_id == input.checkout_session_id)
        {
            return Ok(RedemptionWrite::SessionTaken);
        }

        stored.use_count += 1;
        if stored.use_count >= stored.max_uses {
            stored.status = ReferralStatus::Used;
        }
        stored.used_by_email = Some(input.purchaser_email.clone());
        stored.used_at = Some(input.redeemed_ts);

        let redemption = RedemptionProfile {
            id: Uuid::new_v4(),
            code: input.code.clone(),
            owner_email: stored.owner_email.clone(),
            purchaser_email: input.purchaser_email.clone(),
            tier_purchased: input.tier_purchased,
            credit_value: input.credit_value,
            checkout_session_id: input.checkout_session_id.clone(),
            discount_pct_applied: input.discount_pct_applied,
            source: input.source,
            redeemed_ts: input.redeemed_ts,
        };
        redemptions.push(redemption.clone());

        let mut owners = self.codes.owners.lock().unwrap();
        let owner = owners
            .entry(redemption.owner_email.clone())
            .or_insert_with(|| ReferralOwnerProfile {
                owner_email: redemption.owner_email.clone(),
                ..Default::default()
            });
        owner.total_redemptions += 1;
        owner.credits_earned += input.owner_credits.max(0);

        Ok(RedemptionWrite::Recorded(redemption))
    }

    async fn count_for_code(&self, code: &str) -> AppResult<i64> {
        Ok(self
            .redemptions
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.code == code)
            .count() as i64)
    }

    async fn list_for_owner(&self, owner_email: &str) -> AppResult<Vec<RedemptionProfile>> {
        Ok(self
            .redemptions
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.owner_email == owner_email)
            .cloned()
            .collect())
    }
}
