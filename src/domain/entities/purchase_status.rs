use serde::{Deserialize, Serialize};

/// Payment state of a purchase. One-time checkouts are `Paid` on completion;
/// installment plans stay `InstallmentsActive` while the schedule runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "purchase_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Paid,
    InstallmentsActive,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Paid => "paid",
            PurchaseStatus::InstallmentsActive => "installments_active",
        }
    }

    pub fn for_installments(installments: u32) -> Self {
        if installments > 1 {
            PurchaseStatus::InstallmentsActive
        } else {
            PurchaseStatus::Paid
        }
    }
}

impl std::fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
