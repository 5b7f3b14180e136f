//! In-memory mock implementations for the purchase ledger repository traits.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        alt_pay::{AltPayRepoTrait, AltPayRequestProfile},
        ledger::{
            CreditLedgerEntry, CreditLedgerRepoTrait, InstallmentPaymentProfile,
            InstallmentPaymentRepoTrait, LicenseProfile, LicenseRepoTrait, NewLicense,
            NewPurchase, PurchaseProfile, PurchaseRepoTrait,
        },
        referral::ReferralOwnerProfile,
    },
    domain::entities::{credit_role::CreditRole, license_status::LicenseStatus},
    test_utils::InMemoryReferralCodeRepo,
};

// ============================================================================
// InMemoryPurchaseRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryPurchaseRepo {
    pub purchases: Mutex<HashMap<String, PurchaseProfile>>,
    /// Every call fails with a database error.
    pub fail: bool,
}

impl InMemoryPurchaseRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_purchases(purchases: Vec<PurchaseProfile>) -> Self {
        let repo = Self::new();
        for purchase in purchases {
            repo.add(purchase);
        }
        repo
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn add(&self, purchase: PurchaseProfile) {
        self.purchases
            .lock()
            .unwrap()
            .insert(purchase.checkout_session_id.clone(), purchase);
    }

    pub fn count(&self) -> usize {
        self.purchases.lock().unwrap().len()
    }

    fn check(&self) -> AppResult<()> {
        if self.fail {
            Err(AppError::Database("purchase store unavailable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PurchaseRepoTrait for InMemoryPurchaseRepo {
    async fn insert_if_absent(&self, input: &NewPurchase) -> AppResult<(PurchaseProfile, bool)> {
        self.check()?;
        let mut purchases = self.purchases.lock().unwrap();
        if let Some(existing) = purchases.get(&input.checkout_session_id) {
            return Ok((existing.clone(), false));
        }

        let created = PurchaseProfile {
            id: Uuid::new_v4(),
            checkout_session_id: input.checkout_session_id.clone(),
            subscription_id: input.subscription_id.clone(),
            email: input.email.clone(),
            tier: input.tier,
            stack_count: input.stack_count,
            installments: input.installments,
            plan_total_cents: input.plan_total_cents,
            discount_pct: input.discount_pct,
            base_credits: input.base_credits,
            bonus_credits: input.bonus_credits,
            referral_extra: input.referral_extra,
            referral_code_used: input.referral_code_used.clone(),
            referral_owner_email: input.referral_owner_email.clone(),
            payment_intent_id: input.payment_intent_id.clone(),
            customer_id: input.customer_id.clone(),
            customer_name: input.customer_name.clone(),
            phone: input.phone.clone(),
            currency: input.currency.clone(),
            status: input.status,
            purchased_at: input.purchased_at,
        };
        purchases.insert(created.checkout_session_id.clone(), created.clone());
        Ok((created, true))
    }

    async fn get_by_session(&self, checkout_session_id: &str) -> AppResult<Option<PurchaseProfile>> {
        self.check()?;
        Ok(self.purchases.lock().unwrap().get(checkout_session_id).cloned())
    }

    async fn get_by_subscription(&self, subscription_id: &str) -> AppResult<Option<PurchaseProfile>> {
        self.check()?;
        Ok(self
            .purchases
            .lock()
            .unwrap()
            .values()
            .find(|p| p.subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn latest_by_email(&self, email: &str) -> AppResult<Option<PurchaseProfile>> {
        self.check()?;
        Ok(self
            .purchases
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.email == email)
            .max_by_key(|p| p.purchased_at)
            .cloned())
    }
}

// ============================================================================
// InMemoryLicenseRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryLicenseRepo {
    pub licenses: Mutex<Vec<LicenseProfile>>,
}

impl InMemoryLicenseRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LicenseRepoTrait for InMemoryLicenseRepo {
    async fn count_by_session(&self, checkout_session_id: &str) -> AppResult<i64> {
        Ok(self
            .licenses
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.checkout_session_id == checkout_session_id)
            .count() as i64)
    }

    async fn insert_many(&self, licenses: &[NewLicense]) -> AppResult<u64> {
        let mut stored = self.licenses.lock().unwrap();
        let mut inserted = 0;
        for new in licenses {
            let exists = stored.iter().any(|l| {
                l.checkout_session_id == new.checkout_session_id && l.unit_index == new.unit_index
            });
            if exists {
                continue;
            }
            stored.push(LicenseProfile {
                license_id: Uuid::new_v4(),
                purchaser_email: new.purchaser_email.clone(),
                tier: new.tier,
                stack_group_id: new.stack_group_id,
                checkout_session_id: new.checkout_session_id.clone(),
                unit_index: new.unit_index,
                status: LicenseStatus::Active,
                created_at: Utc::now(),
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn list_by_session(&self, checkout_session_id: &str) -> AppResult<Vec<LicenseProfile>> {
        Ok(self
            .licenses
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.checkout_session_id == checkout_session_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// InMemoryInstallmentPaymentRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryInstallmentPaymentRepo {
    pub payments: Mutex<HashMap<String, InstallmentPaymentProfile>>,
}

impl InMemoryInstallmentPaymentRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstallmentPaymentRepoTrait for InMemoryInstallmentPaymentRepo {
    async fn insert_if_absent(&self, payment: &InstallmentPaymentProfile) -> AppResult<bool> {
        let mut payments = self.payments.lock().unwrap();
        if payments.contains_key(&payment.invoice_id) {
            return Ok(false);
        }
        payments.insert(payment.invoice_id.clone(), payment.clone());
        Ok(true)
    }

    async fn list_by_subscription(
        &self,
        subscription_id: &str,
    ) -> AppResult<Vec<InstallmentPaymentProfile>> {
        let mut payments: Vec<InstallmentPaymentProfile> = self
            .payments
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.subscription_id == subscription_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.paid_at);
        Ok(payments)
    }
}

// ============================================================================
// InMemoryCreditLedgerRepo
// ============================================================================

/// Shares the code repo so referrer credits land in the owner rollup together
/// with their ledger row.
pub struct InMemoryCreditLedgerRepo {
    pub entries: Mutex<Vec<CreditLedgerEntry>>,
    codes: Arc<InMemoryReferralCodeRepo>,
}

impl InMemoryCreditLedgerRepo {
    pub fn new(codes: Arc<InMemoryReferralCodeRepo>) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            codes,
        }
    }
}

#[async_trait]
impl CreditLedgerRepoTrait for InMemoryCreditLedgerRepo {
    async fn count_by_role(&self, subscription_id: &str, role: CreditRole) -> AppResult<i64> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.subscription_id == subscription_id && e.role == role)
            .count() as i64)
    }

    async fn find_by_invoice(
        &self,
        invoice_id: &str,
        role: CreditRole,
    ) -> AppResult<Option<CreditLedgerEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.invoice_id == invoice_id && e.role == role)
            .cloned())
    }

    async fn insert_if_absent(&self, entry: &CreditLedgerEntry) -> AppResult<bool> {
        let mut entries = self.entries.lock().unwrap();
        let taken = entries.iter().any(|e| {
            e.role == entry.role
                && (e.invoice_id == entry.invoice_id
                    || (e.subscription_id == entry.subscription_id
                        && e.installment_index == entry.installment_index))
        });
        if taken {
            return Ok(false);
        }
        entries.push(entry.clone());

        if entry.role == CreditRole::Referrer {
            let mut owners = self.codes.owners.lock().unwrap();
            let owner = owners
                .entry(entry.recipient_email.clone())
                .or_insert_with(|| ReferralOwnerProfile {
                    owner_email: entry.recipient_email.clone(),
                    ..Default::default()
                });
            owner.credits_earned += entry.amount.max(0);
        }
        Ok(true)
    }

    async fn list_by_subscription(&self, subscription_id: &str) -> AppResult<Vec<CreditLedgerEntry>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.subscription_id == subscription_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// InMemoryAltPayRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryAltPayRepo {
    pub requests: Mutex<HashMap<String, AltPayRequestProfile>>,
}

impl InMemoryAltPayRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<AltPayRequestProfile> {
        self.requests.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl AltPayRepoTrait for InMemoryAltPayRepo {
    async fn insert_if_absent(&self, request: &AltPayRequestProfile) -> AppResult<bool> {
        let mut requests = self.requests.lock().unwrap();
        if requests.contains_key(&request.reference) {
            return Ok(false);
        }
        requests.insert(request.reference.clone(), request.clone());
        Ok(true)
    }
}
