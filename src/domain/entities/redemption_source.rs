use serde::{Deserialize, Serialize};

/// How a redemption was recorded: by the checkout webhook, or by the purchaser after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "redemption_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RedemptionSource {
    Checkout,
    Manual,
}

impl RedemptionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedemptionSource::Checkout => "checkout",
            RedemptionSource::Manual => "manual",
        }
    }
}
