//! Pure pricing math: discount decay, bonus decay, installment fees,
//! referral proration and the per-request quote that ties them together.

pub mod bonus;
pub mod clock;
pub mod config;
pub mod freeze;
pub mod installments;
pub mod money;
pub mod proration;
pub mod quote;

pub use bonus::BonusEngine;
pub use clock::DiscountClock;
pub use config::PricingConfig;
pub use installments::InstallmentPlan;
pub use quote::{PricingQuote, ReferralDecision};
