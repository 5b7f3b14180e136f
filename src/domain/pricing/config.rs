use chrono::{DateTime, Utc};
use serde::Serialize;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// 2025-07-27T00:00:00-06:00
pub const DEFAULT_LAUNCH_EPOCH_SECS: i64 = 1_753_596_000;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscountPolicy {
    pub start_pct: u32,
    pub floor_pct: u32,
    pub daily_decrement: u32,
    /// Replaces the computed discount outright.
    pub override_pct: Option<u32>,
    /// Freezes the discount at its last computed value.
    pub hold: bool,
}

impl Default for DiscountPolicy {
    fn default() -> Self {
        Self {
            start_pct: 50,
            floor_pct: 0,
            daily_decrement: 1,
            override_pct: None,
            hold: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BonusPolicy {
    pub daily_decay_rate: f64,
    /// Percentage of the tier's base credits served instead of the decayed bonus.
    pub override_pct_of_base: Option<u32>,
    pub hold: bool,
}

impl Default for BonusPolicy {
    fn default() -> Self {
        Self {
            daily_decay_rate: 0.02,
            override_pct_of_base: None,
            hold: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferralPolicy {
    /// Discount forced onto any checkout carrying a valid code.
    pub discount_pct: u32,
    /// Share of (base + bonus) credits awarded to each side of a referral.
    pub credit_pct: u32,
}

impl Default for ReferralPolicy {
    fn default() -> Self {
        Self {
            discount_pct: 50,
            credit_pct: 10,
        }
    }
}

/// Runtime pricing knobs. A new value gets a new `version`; computations
/// receive the value explicitly rather than reading globals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PricingConfig {
    pub version: u64,
    pub launch_at: DateTime<Utc>,
    pub discount: DiscountPolicy,
    pub bonus: BonusPolicy,
    pub referral: ReferralPolicy,
    pub banner_text: Option<String>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            version: 1,
            launch_at: DateTime::from_timestamp(DEFAULT_LAUNCH_EPOCH_SECS, 0).unwrap_or_default(),
            discount: DiscountPolicy::default(),
            bonus: BonusPolicy::default(),
            referral: ReferralPolicy::default(),
            banner_text: None,
        }
    }
}

impl PricingConfig {
    /// Whole days since launch, clamped to zero before launch.
    pub fn days_elapsed(&self, at: DateTime<Utc>) -> i64 {
        let secs = (at - self.launch_at).num_seconds();
        secs.max(0).div_euclid(SECONDS_PER_DAY)
    }

    /// Derives the next config version with `change` applied.
    pub fn revised(&self, change: impl FnOnce(&mut PricingConfig)) -> PricingConfig {
        let mut next = self.clone();
        change(&mut next);
        next.version = self.version + 1;
        next
    }
}
