use serde::Serialize;

use super::clock::applied_discount_pct;
use super::config::{PricingConfig, ReferralPolicy};
use super::installments::{InstallmentPlan, offered_plans, plan_for};
use super::money::discounted_cents;
use crate::domain::entities::tier::Tier;

/// Outcome of looking up a referral code for a quote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferralDecision {
    pub valid: bool,
    pub code: Option<String>,
    pub owner_email: Option<String>,
}

impl ReferralDecision {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn accepted(code: String, owner_email: String) -> Self {
        Self {
            valid: true,
            code: Some(code),
            owner_email: Some(owner_email),
        }
    }

    pub fn rejected(code: Option<String>) -> Self {
        Self {
            valid: false,
            code,
            owner_email: None,
        }
    }
}

/// Referral credits per unit: `floor((base + bonus) * creditPct / 100)`.
pub fn referral_extra_per_unit(base_credits: i64, bonus_credits: i64, policy: &ReferralPolicy) -> i64 {
    (base_credits + bonus_credits).max(0) * i64::from(policy.credit_pct) / 100
}

/// A fully derived price for one request. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingQuote {
    pub config_version: u64,
    pub tier: Tier,
    pub stack_count: u32,
    pub discount_pct: u32,
    pub unit_price_cents: i64,
    pub one_time_total_cents: i64,
    pub base_credits: i64,
    pub bonus_credits: i64,
    pub referral: ReferralDecision,
    pub referral_extra_per_unit: i64,
    pub referral_extra_total: i64,
    pub installment_options: Vec<InstallmentPlan>,
}

impl PricingQuote {
    pub fn compute(
        tier: Tier,
        stack_count: u32,
        clock_discount_pct: u32,
        bonus_credits: i64,
        referral: ReferralDecision,
        config: &PricingConfig,
    ) -> Self {
        let entry = tier.catalog();
        let stack = stack_count.max(1);
        let discount_pct = applied_discount_pct(clock_discount_pct, referral.valid, &config.referral);
        let unit_price_cents = discounted_cents(entry.base_price_cents, discount_pct);
        let one_time_total_cents = unit_price_cents * i64::from(stack);

        let referral_extra_per_unit = if referral.valid {
            referral_extra_per_unit(entry.base_credits, bonus_credits, &config.referral)
        } else {
            0
        };

        Self {
            config_version: config.version,
            tier,
            stack_count: stack,
            discount_pct,
            unit_price_cents,
            one_time_total_cents,
            base_credits: entry.base_credits,
            bonus_credits,
            referral,
            referral_extra_per_unit,
            referral_extra_total: referral_extra_per_unit * i64::from(stack),
            installment_options: offered_plans(one_time_total_cents),
        }
    }

    /// The plan for `installments` payments, or `None` when it is not offered.
    pub fn plan(&self, installments: u32) -> Option<InstallmentPlan> {
        plan_for(self.one_time_total_cents, installments)
    }
}
