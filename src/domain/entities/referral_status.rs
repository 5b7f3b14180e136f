use serde::{Deserialize, Serialize};

/// Lifecycle of a referral code. `Issued` codes can still be validated and claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "referral_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Issued,
    Used,
}

impl ReferralStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralStatus::Issued => "issued",
            ReferralStatus::Used => "used",
        }
    }

    pub fn is_redeemable(&self) -> bool {
        matches!(self, ReferralStatus::Issued)
    }
}

impl Default for ReferralStatus {
    fn default() -> Self {
        ReferralStatus::Issued
    }
}

impl std::fmt::Display for ReferralStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
