use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use super::config::{BonusPolicy, PricingConfig};
use super::freeze::FreezeState;
use super::money::round_div;
use crate::domain::entities::tier::Tier;

/// `max(0, start - round(start * rate * days))`.
pub fn decayed_bonus_credits(tier: Tier, days_elapsed: i64, policy: &BonusPolicy) -> i64 {
    let start = tier.catalog().start_bonus_credits;
    let days = days_elapsed.max(0);
    let dropped = (start as f64 * policy.daily_decay_rate.max(0.0) * days as f64).round() as i64;
    (start - dropped).max(0)
}

/// Override bonus expressed as a percentage of the tier's base credits.
pub fn override_bonus_credits(tier: Tier, pct_of_base: u32) -> i64 {
    round_div(tier.catalog().base_credits * i64::from(pct_of_base), 100)
}

/// Per-tier decaying sign-up bonus. Each tier keeps its own hold cache.
#[derive(Debug, Default)]
pub struct BonusEngine {
    states: Mutex<HashMap<Tier, FreezeState>>,
}

impl BonusEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_credits(&self, tier: Tier, now: DateTime<Utc>, config: &PricingConfig) -> i64 {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states.entry(tier).or_default();
        state
            .observe(
                now,
                config.bonus.hold,
                config
                    .bonus
                    .override_pct_of_base
                    .map(|pct| override_bonus_credits(tier, pct)),
                |at| decayed_bonus_credits(tier, config.days_elapsed(at), &config.bonus),
            )
            .max(0)
    }
}
