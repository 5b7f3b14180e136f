use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Purchasable license level.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[sqlx(type_name = "license_tier", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Tier {
    Solo,
    Plus,
    Pro,
    Agency,
}

/// Static catalog row for a tier. Prices are in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierSpec {
    pub label: &'static str,
    pub base_price_cents: i64,
    pub base_credits: i64,
    pub start_bonus_credits: i64,
    pub product_id: &'static str,
}

impl Tier {
    pub const fn catalog(self) -> TierSpec {
        match self {
            Tier::Solo => TierSpec {
                label: "Solo",
                base_price_cents: 4_900,
                base_credits: 250,
                start_bonus_credits: 200,
                product_id: "snap_solo_ltd",
            },
            Tier::Plus => TierSpec {
                label: "Plus",
                base_price_cents: 14_900,
                base_credits: 1_000,
                start_bonus_credits: 200,
                product_id: "snap_plus_ltd",
            },
            Tier::Pro => TierSpec {
                label: "Pro",
                base_price_cents: 29_900,
                base_credits: 5_000,
                start_bonus_credits: 1_000,
                product_id: "snap_pro_ltd",
            },
            Tier::Agency => TierSpec {
                label: "Agency",
                base_price_cents: 49_900,
                base_credits: 10_000,
                start_bonus_credits: 2_000,
                product_id: "snap_agency_ltd",
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }

    /// Parses a user-supplied tier key, tolerating whitespace and case.
    pub fn from_key(key: &str) -> Option<Tier> {
        key.trim().parse().ok()
    }
}
