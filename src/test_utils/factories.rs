//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
    application::use_cases::{
        ledger::PurchaseProfile,
        referral::{NewRedemption, ReferralCodeProfile},
    },
    domain::entities::{
        purchase_status::PurchaseStatus, redemption_source::RedemptionSource,
        referral_status::ReferralStatus, tier::Tier,
    },
};

/// Create a single-use issued referral code with sensible defaults.
pub fn create_test_code(overrides: impl FnOnce(&mut ReferralCodeProfile)) -> ReferralCodeProfile {
    let mut code = ReferralCodeProfile {
        code: "OWNER-ABCDEFGH".to_string(),
        owner_email: "owner@example.com".to_string(),
        issued_date: test_date(),
        status: ReferralStatus::Issued,
        used_by_email: None,
        used_at: None,
        max_uses: 1,
        use_count: 0,
        created_at: test_datetime(),
    };
    overrides(&mut code);
    code
}

/// Create a paid one-time purchase with sensible defaults.
pub fn create_test_purchase(overrides: impl FnOnce(&mut PurchaseProfile)) -> PurchaseProfile {
    let mut purchase = PurchaseProfile {
        id: Uuid::new_v4(),
        checkout_session_id: format!("cs_test_{}", Uuid::new_v4().simple()),
        subscription_id: None,
        email: "buyer@example.com".to_string(),
        tier: Tier::Plus,
        stack_count: 1,
        installments: 1,
        plan_total_cents: 11_920,
        discount_pct: 20,
        base_credits: 1_000,
        bonus_credits: 200,
        referral_extra: 0,
        referral_code_used: None,
        referral_owner_email: None,
        payment_intent_id: Some("pi_test".to_string()),
        customer_id: Some("cus_test".to_string()),
        customer_name: Some("Test Buyer".to_string()),
        phone: None,
        currency: "usd".to_string(),
        status: PurchaseStatus::Paid,
        purchased_at: test_datetime(),
    };
    overrides(&mut purchase);
    purchase
}

/// Create a checkout redemption of `OWNER-ABCDEFGH` for a fresh session.
pub fn create_test_redemption(overrides: impl FnOnce(&mut NewRedemption)) -> NewRedemption {
    let mut redemption = NewRedemption {
        code: "OWNER-ABCDEFGH".to_string(),
        purchaser_email: "buyer@example.com".to_string(),
        tier_purchased: Tier::Plus,
        credit_value: 120,
        checkout_session_id: format!("cs_test_{}", Uuid::new_v4().simple()),
        discount_pct_applied: 50,
        source: RedemptionSource::Checkout,
        redeemed_ts: test_datetime(),
        owner_credits: 120,
    };
    overrides(&mut redemption);
    redemption
}

pub fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 1).unwrap()
}

/// Fixed instant used by fixtures: 2025-08-01T12:00:00Z.
pub fn test_datetime() -> DateTime<Utc> {
    test_date().and_hms_opt(12, 0, 0).unwrap().and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let code = create_test_code(|c| c.max_uses = 3);
        assert_eq!(code.max_uses, 3);
        assert_eq!(code.status, ReferralStatus::Issued);

        let a = create_test_purchase(|_| {});
        let b = create_test_purchase(|_| {});
        assert_ne!(a.checkout_session_id, b.checkout_session_id);
    }
}
