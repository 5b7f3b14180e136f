use serde::{Deserialize, Serialize};

/// Which side of a referral a credit ledger row pays out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "credit_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CreditRole {
    Referrer,
    Referee,
}

impl CreditRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditRole::Referrer => "referrer",
            CreditRole::Referee => "referee",
        }
    }
}

impl std::fmt::Display for CreditRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
