pub mod alt_pay;
pub mod ledger;
pub mod pricing;
pub mod reconciliation;
pub mod referral;
