use serde::Serialize;

use super::money::round_div;

pub const MIN_INSTALLMENTS: u32 = 2;
pub const MAX_INSTALLMENTS: u32 = 12;
pub const MIN_PER_PAYMENT_CENTS: i64 = 4_000;
/// Totals in this range always get the 2-payment plan.
pub const TWO_PAY_CARVE_OUT_CENTS: std::ops::RangeInclusive<i64> = 5_000..=10_000;
pub const FEE_FLOOR_PER_EXTRA_PAYMENT_CENTS: i64 = 500;

/// A payment plan for a one-time total. `installments == 1` is the one-time charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InstallmentPlan {
    pub installments: u32,
    pub total_cents: i64,
    pub fee_cents: i64,
    pub gross_cents: i64,
    pub per_payment_cents: i64,
}

impl InstallmentPlan {
    pub fn one_time(total_cents: i64) -> Self {
        Self {
            installments: 1,
            total_cents,
            fee_cents: 0,
            gross_cents: total_cents,
            per_payment_cents: total_cents,
        }
    }

    /// Fee is 1% per payment, with a floor of $5 per payment beyond the first.
    pub fn compute(total_cents: i64, installments: u32) -> Self {
        if installments <= 1 {
            return Self::one_time(total_cents);
        }
        let n = i64::from(installments);
        let percent_fee = round_div(total_cents * n, 100);
        let fee_cents = percent_fee.max(FEE_FLOOR_PER_EXTRA_PAYMENT_CENTS * (n - 1));
        let gross_cents = total_cents + fee_cents;
        Self {
            installments,
            total_cents,
            fee_cents,
            gross_cents,
            per_payment_cents: round_div(gross_cents, n),
        }
    }

    pub fn is_offered(&self) -> bool {
        if self.installments == 1 {
            return true;
        }
        if !(MIN_INSTALLMENTS..=MAX_INSTALLMENTS).contains(&self.installments) {
            return false;
        }
        self.per_payment_cents >= MIN_PER_PAYMENT_CENTS
            || (self.installments == 2 && TWO_PAY_CARVE_OUT_CENTS.contains(&self.total_cents))
    }

    /// Fee as a fraction of the one-time total.
    pub fn fee_percent_effective(&self) -> f64 {
        if self.total_cents == 0 {
            return 0.0;
        }
        self.fee_cents as f64 / self.total_cents as f64
    }

    /// Referral credits delivered with each payment of this plan.
    pub fn approx_credits_per_payment(&self, referral_extra_total: i64) -> i64 {
        referral_extra_total.max(0) / i64::from(self.installments.max(1))
    }
}

/// Multi-payment plans offered for `total_cents`, ascending by length.
pub fn offered_plans(total_cents: i64) -> Vec<InstallmentPlan> {
    (MIN_INSTALLMENTS..=MAX_INSTALLMENTS)
        .map(|n| InstallmentPlan::compute(total_cents, n))
        .filter(InstallmentPlan::is_offered)
        .collect()
}

/// The plan for a requested installment count, if it is offered.
pub fn plan_for(total_cents: i64, installments: u32) -> Option<InstallmentPlan> {
    let plan = InstallmentPlan::compute(total_cents, installments);
    (installments >= 1 && plan.is_offered()).then_some(plan)
}
