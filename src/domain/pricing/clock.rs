use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use super::config::{DiscountPolicy, PricingConfig, ReferralPolicy};
use super::freeze::FreezeState;

/// `max(floor, start - decrement * days)`, bounded to a valid percentage.
pub fn decayed_discount_pct(days_elapsed: i64, policy: &DiscountPolicy) -> u32 {
    let days = days_elapsed.max(0);
    let decayed = i64::from(policy.start_pct) - i64::from(policy.daily_decrement) * days;
    decayed.max(i64::from(policy.floor_pct)).clamp(0, 100) as u32
}

/// A valid referral replaces the clock's discount with the referral rate.
pub fn applied_discount_pct(clock_pct: u32, referral_valid: bool, policy: &ReferralPolicy) -> u32 {
    if referral_valid {
        policy.discount_pct.min(100)
    } else {
        clock_pct
    }
}

/// Daily-decaying discount with override and hold.
#[derive(Debug, Default)]
pub struct DiscountClock {
    state: Mutex<FreezeState>,
}

impl DiscountClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_pct(&self, now: DateTime<Utc>, config: &PricingConfig) -> u32 {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let value = state.observe(
            now,
            config.discount.hold,
            config.discount.override_pct.map(|pct| i64::from(pct.min(100))),
            |at| i64::from(decayed_discount_pct(config.days_elapsed(at), &config.discount)),
        );
        value.clamp(0, 100) as u32
    }
}
