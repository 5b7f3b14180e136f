use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::Sha256;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::application::use_cases::ledger::PurchaseRepoTrait;
use crate::application::validators::{is_valid_email, normalize_code, normalize_email};
use crate::domain::entities::{
    redemption_source::RedemptionSource, referral_status::ReferralStatus, tier::Tier,
};
use crate::domain::pricing::config::ReferralPolicy;
use crate::domain::pricing::quote::{ReferralDecision, referral_extra_per_unit};

/// Unambiguous uppercase alphabet (no I, O, 0, 1). 32 symbols, so byte % 32 is unbiased.
const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const TOKEN_LEN: usize = 8;
const PREFIX_LEN: usize = 6;
const MAX_MINT_ATTEMPTS: u32 = 5;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ReferralCodeProfile {
    pub code: String,
    pub owner_email: String,
    pub issued_date: NaiveDate,
    pub status: ReferralStatus,
    pub used_by_email: Option<String>,
    pub used_at: Option<DateTime<Utc>>,
    pub max_uses: i32,
    pub use_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReferralCode {
    pub code: String,
    pub owner_email: String,
    pub issued_date: NaiveDate,
    pub max_uses: i32,
}

/// Result of inserting a code keyed by (owner, day) and by code.
#[derive(Debug, Clone)]
pub enum CodeInsert {
    Created(ReferralCodeProfile),
    /// The owner already has a code for that day.
    Existing(ReferralCodeProfile),
    /// The minted code collides with another owner's code.
    CodeTaken,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferralOwnerProfile {
    pub owner_email: String,
    pub total_codes_issued: i64,
    pub total_redemptions: i64,
    pub credits_earned: i64,
}

/// Additive change to an owner's rollup. Rollups never decrease.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwnerDelta {
    pub codes_issued: i64,
    pub redemptions: i64,
    pub credits: i64,
}

impl OwnerDelta {
    pub fn code_issued() -> Self {
        Self {
            codes_issued: 1,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RedemptionProfile {
    pub id: Uuid,
    pub code: String,
    pub owner_email: String,
    pub purchaser_email: String,
    pub tier_purchased: Tier,
    pub credit_value: i64,
    pub checkout_session_id: String,
    pub discount_pct_applied: i32,
    pub source: RedemptionSource,
    pub redeemed_ts: DateTime<Utc>,
}

/// One use of a code, applied to one checkout session. The owner comes from
/// the code row.
#[derive(Debug, Clone)]
pub struct NewRedemption {
    pub code: String,
    pub purchaser_email: String,
    pub tier_purchased: Tier,
    pub credit_value: i64,
    pub checkout_session_id: String,
    pub discount_pct_applied: i32,
    pub source: RedemptionSource,
    pub redeemed_ts: DateTime<Utc>,
    /// Added to the owner's `credits_earned` along with the redemption.
    pub owner_credits: i64,
}

#[derive(Debug, Clone)]
pub enum RedemptionWrite {
    Recorded(RedemptionProfile),
    /// The session already has a redemption.
    SessionTaken,
    /// The code is unknown, used up, or revoked.
    Unclaimable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RedeemOutcome {
    pub credit_value: i64,
    /// Percentage points of discount the purchaser missed out on at checkout.
    pub discount_refund_due: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralHistory {
    pub total_redemptions: i64,
    pub credits_earned: i64,
    pub redemptions: Vec<RedemptionProfile>,
}

// ============================================================================
// Repository traits
// ============================================================================

#[async_trait]
pub trait ReferralCodeRepoTrait: Send + Sync {
    async fn find_code(&self, code: &str) -> AppResult<Option<ReferralCodeProfile>>;
    async fn find_for_owner_on(&self, owner_email: &str, day: NaiveDate) -> AppResult<Option<ReferralCodeProfile>>;
    async fn insert_code_if_absent(&self, input: &NewReferralCode) -> AppResult<CodeInsert>;
    async fn get_owner(&self, owner_email: &str) -> AppResult<Option<ReferralOwnerProfile>>;
    /// Upserts the owner and adds `delta` to its counters.
    async fn bump_owner(&self, owner_email: &str, delta: OwnerDelta) -> AppResult<ReferralOwnerProfile>;
}

#[async_trait]
pub trait RedemptionRepoTrait: Send + Sync {
    async fn exists_for_session(&self, checkout_session_id: &str) -> AppResult<bool>;
    /// Consumes one use of the code, inserts the redemption and bumps the
    /// owner's rollup as one unit. Nothing is written unless all three land.
    /// The code flips to `used` once `use_count` reaches `max_uses`.
    async fn redeem_code(&self, input: &NewRedemption) -> AppResult<RedemptionWrite>;
    async fn count_for_code(&self, code: &str) -> AppResult<i64>;
    async fn list_for_owner(&self, owner_email: &str) -> AppResult<Vec<RedemptionProfile>>;
}

// ============================================================================
// Code minting
// ============================================================================

/// `<PREFIX>-<TOKEN>`: prefix from the email's local part, token from
/// HMAC-SHA256(secret, "owner|day|attempt") mapped onto [`CODE_ALPHABET`].
pub fn mint_code(secret: &str, owner_email: &str, day: NaiveDate, attempt: u32) -> AppResult<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("HMAC error".into()))?;
    mac.update(format!("{owner_email}|{day}|{attempt}").as_bytes());
    let digest = mac.finalize().into_bytes();

    let token: String = digest
        .iter()
        .take(TOKEN_LEN)
        .map(|b| CODE_ALPHABET[usize::from(*b) % CODE_ALPHABET.len()] as char)
        .collect();

    Ok(format!("{}-{}", owner_prefix(owner_email), token))
}

fn owner_prefix(owner_email: &str) -> String {
    let local = owner_email.split('@').next().unwrap_or_default();
    let prefix: String = local
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(PREFIX_LEN)
        .collect::<String>()
        .to_uppercase();
    if prefix.is_empty() {
        "REF".to_string()
    } else {
        prefix
    }
}

// ============================================================================
// Use cases
// ============================================================================

#[derive(Clone)]
pub struct ReferralUseCases {
    codes: Arc<dyn ReferralCodeRepoTrait>,
    redemptions: Arc<dyn RedemptionRepoTrait>,
    purchases: Arc<dyn PurchaseRepoTrait>,
    code_secret: SecretString,
    max_uses: i32,
}

impl ReferralUseCases {
    pub fn new(
        codes: Arc<dyn ReferralCodeRepoTrait>,
        redemptions: Arc<dyn RedemptionRepoTrait>,
        purchases: Arc<dyn PurchaseRepoTrait>,
        code_secret: SecretString,
    ) -> Self {
        Self {
            codes,
            redemptions,
            purchases,
            code_secret,
            max_uses: 1,
        }
    }

    /// Checks a code without touching it. Blank codes never reach the store.
    #[instrument(skip(self))]
    pub async fn validate(&self, code: Option<&str>) -> AppResult<ReferralDecision> {
        let Some(code) = code.and_then(normalize_code) else {
            return Ok(ReferralDecision::none());
        };

        match self.codes.find_code(&code).await? {
            Some(stored) if stored.status.is_redeemable() => {
                Ok(ReferralDecision::accepted(stored.code, stored.owner_email))
            }
            _ => Ok(ReferralDecision::rejected(Some(code))),
        }
    }

    /// Returns the owner's code for `today`, minting it on first request.
    #[instrument(skip(self))]
    pub async fn issue(&self, owner_email: &str, today: NaiveDate) -> AppResult<ReferralCodeProfile> {
        let owner_email = normalize_email(owner_email);
        if !is_valid_email(&owner_email) {
            return Err(AppError::InvalidInput("Invalid email format".into()));
        }

        if let Some(existing) = self.codes.find_for_owner_on(&owner_email, today).await? {
            return Ok(existing);
        }

        if self.purchases.latest_by_email(&owner_email).await?.is_none() {
            return Err(AppError::NotPurchaser);
        }

        for attempt in 0..MAX_MINT_ATTEMPTS {
            let code = mint_code(
                self.code_secret.expose_secret(),
                &owner_email,
                today,
                attempt,
            )?;
            let input = NewReferralCode {
                code,
                owner_email: owner_email.clone(),
                issued_date: today,
                max_uses: self.max_uses,
            };

            match self.codes.insert_code_if_absent(&input).await? {
                CodeInsert::Created(created) => {
                    self.codes
                        .bump_owner(&owner_email, OwnerDelta::code_issued())
                        .await?;
                    info!(code = %created.code, "Referral code issued");
                    return Ok(created);
                }
                CodeInsert::Existing(existing) => return Ok(existing),
                CodeInsert::CodeTaken => {
                    warn!(attempt, "Minted referral code collided, retrying");
                }
            }
        }

        Err(AppError::Internal("could not mint a unique referral code".into()))
    }

    /// Applies a code to a purchase made without one.
    #[instrument(skip(self, policy))]
    pub async fn redeem_after(
        &self,
        code: &str,
        purchaser_email: &str,
        policy: &ReferralPolicy,
        now: DateTime<Utc>,
    ) -> AppResult<RedeemOutcome> {
        let code = normalize_code(code).ok_or(AppError::InvalidReferral)?;
        let purchaser_email = normalize_email(purchaser_email);
        if !is_valid_email(&purchaser_email) {
            return Err(AppError::InvalidInput("Invalid email format".into()));
        }

        let purchase = self
            .purchases
            .latest_by_email(&purchaser_email)
            .await?
            .ok_or(AppError::NotPurchaser)?;

        if self
            .redemptions
            .exists_for_session(&purchase.checkout_session_id)
            .await?
        {
            return Err(AppError::InvalidReferral);
        }

        let stored = self
            .codes
            .find_code(&code)
            .await?
            .ok_or(AppError::InvalidReferral)?;
        if !stored.status.is_redeemable() || stored.owner_email == purchaser_email {
            return Err(AppError::InvalidReferral);
        }
        if self.redemptions.count_for_code(&code).await? >= i64::from(stored.max_uses) {
            return Err(AppError::InvalidReferral);
        }

        let per_unit = referral_extra_per_unit(purchase.base_credits, purchase.bonus_credits, policy);
        let credit_value = per_unit * i64::from(purchase.stack_count.max(1));
        let discount_refund_due = (policy.discount_pct as i32 - purchase.discount_pct).max(0);

        let write = self
            .redemptions
            .redeem_code(&NewRedemption {
                code: code.clone(),
                purchaser_email: purchaser_email.clone(),
                tier_purchased: purchase.tier,
                credit_value,
                checkout_session_id: purchase.checkout_session_id.clone(),
                discount_pct_applied: policy.discount_pct as i32,
                source: RedemptionSource::Manual,
                redeemed_ts: now,
                owner_credits: credit_value,
            })
            .await?;
        let redemption = match write {
            RedemptionWrite::Recorded(redemption) => redemption,
            RedemptionWrite::SessionTaken => {
                warn!(
                    session_id = %purchase.checkout_session_id,
                    "Manual redemption lost a race with checkout reconciliation"
                );
                return Err(AppError::InvalidReferral);
            }
            RedemptionWrite::Unclaimable => return Err(AppError::InvalidReferral),
        };

        info!(code = %redemption.code, credit_value, "Referral redeemed after purchase");
        Ok(RedeemOutcome {
            credit_value,
            discount_refund_due,
        })
    }

    #[instrument(skip(self))]
    pub async fn history(&self, owner_email: &str) -> AppResult<ReferralHistory> {
        let owner_email = normalize_email(owner_email);
        if owner_email.is_empty() {
            return Err(AppError::InvalidInput("Email is required".into()));
        }

        let owner = self.codes.get_owner(&owner_email).await?.unwrap_or_default();
        let mut redemptions = self.redemptions.list_for_owner(&owner_email).await?;
        redemptions.sort_by(|a, b| b.redeemed_ts.cmp(&a.redeemed_ts));

        Ok(ReferralHistory {
            total_redemptions: owner.total_redemptions,
            credits_earned: owner.credits_earned,
            redemptions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::test_utils::{
        InMemoryPurchaseRepo, InMemoryRedemptionRepo, InMemoryReferralCodeRepo, create_test_code,
        create_test_purchase, create_test_redemption, test_datetime,
    };

    struct Harness {
        codes: Arc<InMemoryReferralCodeRepo>,
        redemptions: Arc<InMemoryRedemptionRepo>,
        use_cases: ReferralUseCases,
    }

    fn harness(
        codes: Vec<ReferralCodeProfile>,
        purchases: Vec<crate::application::use_cases::ledger::PurchaseProfile>,
    ) -> Harness {
        let codes = Arc::new(InMemoryReferralCodeRepo::with_codes(codes));
        let redemptions = Arc::new(InMemoryRedemptionRepo::new(codes.clone()));
        let purchases = Arc::new(InMemoryPurchaseRepo::with_purchases(purchases));
        let use_cases = ReferralUseCases::new(
            codes.clone(),
            redemptions.clone(),
            purchases,
            SecretString::new("test_referral_secret".into()),
        );
        Harness {
            codes,
            redemptions,
            use_cases,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 8, d).unwrap()
    }

    // =========================================================================
    // mint_code
    // =========================================================================

    #[test]
    fn minted_code_has_prefix_and_unambiguous_token() {
        let code = mint_code("secret", "jane.doe+ltd@example.com", day(1), 0).unwrap();
        let (prefix, token) = code.split_once('-').unwrap();
        assert_eq!(prefix, "JANEDO");
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.bytes().all(|b| CODE_ALPHABET.contains(&b)));
    }

    #[test]
    fn minted_code_is_deterministic_per_owner_day_and_attempt() {
        let a = mint_code("secret", "jane@example.com", day(1), 0).unwrap();
        assert_eq!(a, mint_code("secret", "jane@example.com", day(1), 0).unwrap());
        assert_ne!(a, mint_code("secret", "jane@example.com", day(2), 0).unwrap());
        assert_ne!(a, mint_code("secret", "jane@example.com", day(1), 1).unwrap());
        assert_ne!(a, mint_code("other", "jane@example.com", day(1), 0).unwrap());
    }

    #[test]
    fn prefix_falls_back_when_local_part_has_no_alphanumerics() {
        assert!(mint_code("secret", "+++@example.com", day(1), 0).unwrap().starts_with("REF-"));
    }

    // =========================================================================
    // validate
    // =========================================================================

    #[tokio::test]
    async fn validate_blank_code_is_invalid() {
        let h = harness(vec![], vec![]);
        assert!(!h.use_cases.validate(None).await.unwrap().valid);
        assert!(!h.use_cases.validate(Some("   ")).await.unwrap().valid);
    }

    #[tokio::test]
    async fn validate_resolves_owner_of_issued_code() {
        let code = create_test_code(|c| {
            c.code = "ALICE-ABCDEFGH".into();
            c.owner_email = "alice@example.com".into();
        });
        let h = harness(vec![code], vec![]);

        let decision = h.use_cases.validate(Some("alice-abcdefgh")).await.unwrap();
        assert!(decision.valid);
        assert_eq!(decision.owner_email.as_deref(), Some("alice@example.com"));
    }

    #[tokio::test]
    async fn validate_used_code_is_invalid() {
        let code = create_test_code(|c| {
            c.code = "ALICE-ABCDEFGH".into();
            c.status = ReferralStatus::Used;
        });
        let h = harness(vec![code], vec![]);
        assert!(!h.use_cases.validate(Some("ALICE-ABCDEFGH")).await.unwrap().valid);
    }

    // =========================================================================
    // issue
    // =========================================================================

    #[tokio::test]
    async fn issue_is_idempotent_per_day_and_bumps_count_once() {
        let purchase = create_test_purchase(|p| p.email = "owner@example.com".into());
        let h = harness(vec![], vec![purchase]);

        let first = h.use_cases.issue("Owner@Example.com", day(3)).await.unwrap();
        let again = h.use_cases.issue("owner@example.com", day(3)).await.unwrap();
        assert_eq!(first.code, again.code);
        let owner = h.codes.get_owner("owner@example.com").await.unwrap().unwrap();
        assert_eq!(owner.total_codes_issued, 1);

        let next_day = h.use_cases.issue("owner@example.com", day(4)).await.unwrap();
        assert_ne!(first.code, next_day.code);
        let owner = h.codes.get_owner("owner@example.com").await.unwrap().unwrap();
        assert_eq!(owner.total_codes_issued, 2);
    }

    #[tokio::test]
    async fn issue_rejects_non_purchasers() {
        let h = harness(vec![], vec![]);
        let err = h.use_cases.issue("stranger@example.com", day(3)).await.unwrap_err();
        assert!(matches!(err, AppError::NotPurchaser));
    }

    #[tokio::test]
    async fn issue_rejects_invalid_email() {
        let h = harness(vec![], vec![]);
        let err = h.use_cases.issue("nope", day(3)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    // =========================================================================
    // redeem_after
    // =========================================================================

    fn redeemable_setup() -> Harness {
        let code = create_test_code(|c| {
            c.code = "ALICE-ABCDEFGH".into();
            c.owner_email = "alice@example.com".into();
        });
        let purchase = create_test_purchase(|p| {
            p.email = "bob@example.com".into();
            p.tier = Tier::Solo;
            p.base_credits = 250;
            p.bonus_credits = 150;
            p.stack_count = 2;
            p.discount_pct = 30;
        });
        harness(vec![code], vec![purchase])
    }

    #[tokio::test]
    async fn redeem_after_credits_owner_and_reports_refund_due() {
        let h = redeemable_setup();
        let outcome = h
            .use_cases
            .redeem_after("alice-abcdefgh", "bob@example.com", &ReferralPolicy::default(), test_datetime())
            .await
            .unwrap();
        assert_eq!(outcome.credit_value, 80);
        assert_eq!(outcome.discount_refund_due, 20);

        let owner = h.codes.get_owner("alice@example.com").await.unwrap().unwrap();
        assert_eq!(owner.total_redemptions, 1);
        assert_eq!(owner.credits_earned, 80);

        let code = h.codes.find_code("ALICE-ABCDEFGH").await.unwrap().unwrap();
        assert_eq!(code.status, ReferralStatus::Used);
        assert_eq!(code.used_by_email.as_deref(), Some("bob@example.com"));
    }

    #[tokio::test]
    async fn redeem_after_twice_fails_with_invalid_or_used_code() {
        let h = redeemable_setup();
        let policy = ReferralPolicy::default();
        h.use_cases
            .redeem_after("ALICE-ABCDEFGH", "bob@example.com", &policy, test_datetime())
            .await
            .unwrap();

        let err = h
            .use_cases
            .redeem_after("ALICE-ABCDEFGH", "bob@example.com", &policy, test_datetime())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidReferral));
        assert_eq!(h.redemptions.count_for_code("ALICE-ABCDEFGH").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_redeem_write_leaves_code_redeemable_for_retry() {
        let h = redeemable_setup();
        let policy = ReferralPolicy::default();
        h.redemptions.fail_next_redeem();

        let err = h
            .use_cases
            .redeem_after("ALICE-ABCDEFGH", "bob@example.com", &policy, test_datetime())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
        let code = h.codes.find_code("ALICE-ABCDEFGH").await.unwrap().unwrap();
        assert_eq!(code.status, ReferralStatus::Issued);
        assert_eq!(code.use_count, 0);
        assert!(h.codes.get_owner("alice@example.com").await.unwrap().is_none());

        let outcome = h
            .use_cases
            .redeem_after("ALICE-ABCDEFGH", "bob@example.com", &policy, test_datetime())
            .await
            .unwrap();
        assert_eq!(outcome.credit_value, 80);
        let owner = h.codes.get_owner("alice@example.com").await.unwrap().unwrap();
        assert_eq!(owner.total_redemptions, 1);
        assert_eq!(owner.credits_earned, 80);
    }

    #[tokio::test]
    async fn redeem_after_rejects_code_claimed_by_checkout() {
        let h = redeemable_setup();
        let write = h
            .redemptions
            .redeem_code(&create_test_redemption(|r| {
                r.code = "ALICE-ABCDEFGH".into();
                r.purchaser_email = "carol@example.com".into();
            }))
            .await
            .unwrap();
        assert!(matches!(write, RedemptionWrite::Recorded(_)));

        let err = h
            .use_cases
            .redeem_after("ALICE-ABCDEFGH", "bob@example.com", &ReferralPolicy::default(), test_datetime())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidReferral));
    }

    #[tokio::test]
    async fn redeem_after_requires_a_purchase() {
        let h = redeemable_setup();
        let err = h
            .use_cases
            .redeem_after("ALICE-ABCDEFGH", "nobody@example.com", &ReferralPolicy::default(), test_datetime())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotPurchaser));
    }

    #[tokio::test]
    async fn redeem_after_rejects_own_code() {
        let code = create_test_code(|c| {
            c.code = "ALICE-ABCDEFGH".into();
            c.owner_email = "alice@example.com".into();
        });
        let purchase = create_test_purchase(|p| p.email = "alice@example.com".into());
        let h = harness(vec![code], vec![purchase]);

        let err = h
            .use_cases
            .redeem_after("ALICE-ABCDEFGH", "alice@example.com", &ReferralPolicy::default(), test_datetime())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidReferral));
    }

    // =========================================================================
    // history
    // =========================================================================

    #[tokio::test]
    async fn history_for_unknown_owner_is_empty() {
        let h = harness(vec![], vec![]);
        let history = h.use_cases.history("ghost@example.com").await.unwrap();
        assert_eq!(history.total_redemptions, 0);
        assert_eq!(history.credits_earned, 0);
        assert!(history.redemptions.is_empty());
    }

    #[tokio::test]
    async fn history_lists_newest_first() {
        let codes = (0..2)
            .map(|i| {
                create_test_code(|c| {
                    c.code = format!("ALICE-CODE000{i}");
                    c.owner_email = "alice@example.com".into();
                })
            })
            .collect();
        let h = harness(codes, vec![]);
        for (i, session) in ["cs_old", "cs_new"].iter().enumerate() {
            h.redemptions
                .redeem_code(&create_test_redemption(|r| {
                    r.code = format!("ALICE-CODE000{i}");
                    r.purchaser_email = format!("buyer{i}@example.com");
                    r.checkout_session_id = session.to_string();
                    r.redeemed_ts = test_datetime() + Duration::days(i as i64);
                }))
                .await
                .unwrap();
        }

        let history = h.use_cases.history("alice@example.com").await.unwrap();
        assert_eq!(history.credits_earned, 240);
        assert_eq!(history.redemptions.len(), 2);
        assert_eq!(history.redemptions[0].checkout_session_id, "cs_new");
    }
}
