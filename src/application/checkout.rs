//! Provider-neutral checkout requests and the metadata contract that rides
//! along with them and comes back on webhook events.

use std::collections::HashMap;

use serde::Serialize;
use url::Url;

use crate::app_error::{AppError, AppResult};
use crate::domain::entities::tier::Tier;
use crate::domain::pricing::{InstallmentPlan, PricingQuote};

pub type MetadataMap = HashMap<String, String>;

pub mod keys {
    pub const TIER: &str = "tier";
    pub const STACK_COUNT: &str = "stackCount";
    pub const INSTALLMENTS: &str = "installments";
    pub const BASE_CREDITS: &str = "baseCredits";
    pub const BONUS_CREDITS: &str = "bonusCredits";
    pub const REFERRAL_EXTRA: &str = "referralExtra";
    pub const REFERRAL_EXTRA_TOTAL: &str = "referralExtraTotal";
    pub const REFERRAL_CODE_USED: &str = "referralCodeUsed";
    pub const REF_OWNER_EMAIL: &str = "refOwnerEmail";
    pub const DISCOUNT_PCT: &str = "discountPct";
    pub const PLAN_TOTAL_CENTS: &str = "planTotalCents";
    pub const PLAN_FEE_CENTS: &str = "planFeeCents";
    pub const PLAN_GROSS_CENTS: &str = "planGrossCents";
    pub const PER_PAYMENT_CENTS: &str = "perPaymentCents";
}

/// Metadata attached to every checkout. It must round-trip unchanged through the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutMetadata {
    pub tier: Tier,
    pub stack_count: u32,
    pub installments: u32,
    pub base_credits: i64,
    pub bonus_credits: i64,
    /// Referral credits per unit.
    pub referral_extra: i64,
    pub referral_extra_total: i64,
    pub referral_code_used: Option<String>,
    pub ref_owner_email: Option<String>,
    pub discount_pct: u32,
    pub plan: Option<PlanAmounts>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanAmounts {
    pub total_cents: i64,
    pub fee_cents: i64,
    pub gross_cents: i64,
    pub per_payment_cents: i64,
}

impl From<InstallmentPlan> for PlanAmounts {
    fn from(plan: InstallmentPlan) -> Self {
        Self {
            total_cents: plan.total_cents,
            fee_cents: plan.fee_cents,
            gross_cents: plan.gross_cents,
            per_payment_cents: plan.per_payment_cents,
        }
    }
}

impl CheckoutMetadata {
    pub fn from_quote(quote: &PricingQuote, plan: &InstallmentPlan) -> Self {
        let is_plan = plan.installments > 1;
        Self {
            tier: quote.tier,
            stack_count: quote.stack_count,
            installments: plan.installments,
            base_credits: quote.base_credits,
            bonus_credits: quote.bonus_credits,
            referral_extra: quote.referral_extra_per_unit,
            referral_extra_total: quote.referral_extra_total,
            referral_code_used: quote.referral.valid.then(|| quote.referral.code.clone()).flatten(),
            ref_owner_email: quote
                .referral
                .valid
                .then(|| quote.referral.owner_email.clone())
                .flatten(),
            discount_pct: quote.discount_pct,
            plan: is_plan.then(|| PlanAmounts::from(*plan)),
        }
    }

    pub fn is_installment_plan(&self) -> bool {
        self.installments > 1
    }

    /// Flattens to string pairs. Absent optional values are omitted.
    pub fn to_map(&self) -> MetadataMap {
        let mut map = MetadataMap::new();
        map.insert(keys::TIER.into(), self.tier.as_str().into());
        map.insert(keys::STACK_COUNT.into(), self.stack_count.to_string());
        map.insert(keys::INSTALLMENTS.into(), self.installments.to_string());
        map.insert(keys::BASE_CREDITS.into(), self.base_credits.to_string());
        map.insert(keys::BONUS_CREDITS.into(), self.bonus_credits.to_string());
        map.insert(keys::REFERRAL_EXTRA.into(), self.referral_extra.to_string());
        map.insert(keys::REFERRAL_EXTRA_TOTAL.into(), self.referral_extra_total.to_string());
        map.insert(keys::DISCOUNT_PCT.into(), self.discount_pct.to_string());
        if let Some(code) = &self.referral_code_used {
            map.insert(keys::REFERRAL_CODE_USED.into(), code.clone());
        }
        if let Some(owner) = &self.ref_owner_email {
            map.insert(keys::REF_OWNER_EMAIL.into(), owner.clone());
        }
        if let Some(plan) = &self.plan {
            map.insert(keys::PLAN_TOTAL_CENTS.into(), plan.total_cents.to_string());
            map.insert(keys::PLAN_FEE_CENTS.into(), plan.fee_cents.to_string());
            map.insert(keys::PLAN_GROSS_CENTS.into(), plan.gross_cents.to_string());
            map.insert(keys::PER_PAYMENT_CENTS.into(), plan.per_payment_cents.to_string());
        }
        map
    }

    /// Reads metadata back from a provider event. Only the tier is mandatory;
    /// counts default to one and credits to zero. Empty strings count as absent.
    pub fn from_map(map: &MetadataMap) -> AppResult<Self> {
        let tier_key = text(map, keys::TIER).unwrap_or_default();
        let tier = Tier::from_key(&tier_key).ok_or(AppError::InvalidTier(tier_key))?;

        let plan = match (
            number::<i64>(map, keys::PLAN_TOTAL_CENTS)?,
            number::<i64>(map, keys::PLAN_GROSS_CENTS)?,
            number::<i64>(map, keys::PER_PAYMENT_CENTS)?,
        ) {
            (Some(total_cents), Some(gross_cents), Some(per_payment_cents)) => Some(PlanAmounts {
                total_cents,
                fee_cents: number::<i64>(map, keys::PLAN_FEE_CENTS)?.unwrap_or(gross_cents - total_cents),
                gross_cents,
                per_payment_cents,
            }),
            _ => None,
        };

        Ok(Self {
            tier,
            stack_count: number::<u32>(map, keys::STACK_COUNT)?.unwrap_or(1).max(1),
            installments: number::<u32>(map, keys::INSTALLMENTS)?.unwrap_or(1).max(1),
            base_credits: number::<i64>(map, keys::BASE_CREDITS)?.unwrap_or(0),
            bonus_credits: number::<i64>(map, keys::BONUS_CREDITS)?.unwrap_or(0),
            referral_extra: number::<i64>(map, keys::REFERRAL_EXTRA)?.unwrap_or(0),
            referral_extra_total: number::<i64>(map, keys::REFERRAL_EXTRA_TOTAL)?.unwrap_or(0),
            referral_code_used: text(map, keys::REFERRAL_CODE_USED),
            ref_owner_email: text(map, keys::REF_OWNER_EMAIL),
            discount_pct: number::<u32>(map, keys::DISCOUNT_PCT)?.unwrap_or(0),
            plan,
        })
    }

    /// Total referral credits for the stack. Older sessions only carry the per-unit value.
    pub fn referral_total(&self) -> i64 {
        if self.referral_extra_total > 0 {
            self.referral_extra_total
        } else {
            self.referral_extra * i64::from(self.stack_count)
        }
    }
}

fn text(map: &MetadataMap, key: &str) -> Option<String> {
    map.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn number<T: std::str::FromStr>(map: &MetadataMap, key: &str) -> AppResult<Option<T>> {
    match text(map, key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| AppError::InvalidInput(format!("metadata {key} is not a number: {raw}"))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutCharge {
    /// One immediate charge of `quantity` units.
    OneTime { unit_amount_cents: i64, quantity: u32 },
    /// Monthly charge, limited to `cycles` payments once the session completes.
    Recurring { amount_cents: i64, cycles: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutUrls {
    pub fn from_app_base(app_base: &Url) -> Self {
        let base = app_base.as_str().trim_end_matches('/');
        Self {
            success_url: format!("{base}/checkout-success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{base}/#plans"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub product_id: &'static str,
    pub currency: &'static str,
    pub charge: CheckoutCharge,
    pub metadata: CheckoutMetadata,
    pub promo_code: Option<String>,
    pub collect_phone: bool,
    pub urls: CheckoutUrls,
}

impl CheckoutRequest {
    /// Builds the request for `installments` payments of `quote`.
    pub fn build(
        quote: &PricingQuote,
        installments: u32,
        promo_code: Option<String>,
        urls: CheckoutUrls,
    ) -> AppResult<Self> {
        let plan = quote.plan(installments).ok_or_else(|| {
            AppError::InvalidInput(format!(
                "{installments}-payment plan is not available for this total"
            ))
        })?;

        let charge = if plan.installments > 1 {
            CheckoutCharge::Recurring {
                amount_cents: plan.per_payment_cents,
                cycles: plan.installments,
            }
        } else {
            CheckoutCharge::OneTime {
                unit_amount_cents: quote.unit_price_cents,
                quantity: quote.stack_count,
            }
        };

        Ok(Self {
            product_id: quote.tier.catalog().product_id,
            currency: "usd",
            charge,
            metadata: CheckoutMetadata::from_quote(quote, &plan),
            promo_code: promo_code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            collect_phone: true,
            urls,
        })
    }

    pub fn is_subscription(&self) -> bool {
        matches!(self.charge, CheckoutCharge::Recurring { .. })
    }
}
