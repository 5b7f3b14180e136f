//! Durable records written by webhook reconciliation, and the repository
//! traits that persist them. Every insert is keyed so repeating it is a no-op.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::app_error::AppResult;
use crate::domain::entities::{
    credit_role::CreditRole, license_status::LicenseStatus, purchase_status::PurchaseStatus,
    tier::Tier,
};

// ============================================================================
// Purchases
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PurchaseProfile {
    pub id: Uuid,
    pub checkout_session_id: String,
    pub subscription_id: Option<String>,
    pub email: String,
    pub tier: Tier,
    pub stack_count: i32,
    pub installments: i32,
    pub plan_total_cents: i64,
    pub discount_pct: i32,
    pub base_credits: i64,
    pub bonus_credits: i64,
    pub referral_extra: i64,
    pub referral_code_used: Option<String>,
    pub referral_owner_email: Option<String>,
    pub payment_intent_id: Option<String>,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub phone: Option<String>,
    pub currency: String,
    pub status: PurchaseStatus,
    pub purchased_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub checkout_session_id: String,
    pub subscription_id: Option<String>,
    pub email: String,
    pub tier: Tier,
    pub stack_count: i32,
    pub installments: i32,
    pub plan_total_cents: i64,
    pub discount_pct: i32,
    pub base_credits: i64,
    pub bonus_credits: i64,
    pub referral_extra: i64,
    pub referral_code_used: Option<String>,
    pub referral_owner_email: Option<String>,
    pub payment_intent_id: Option<String>,
    pub customer_id: Option<String>,
    pub customer_name: Option<String>,
    pub phone: Option<String>,
    pub currency: String,
    pub status: PurchaseStatus,
    pub purchased_at: DateTime<Utc>,
}

#[async_trait]
pub trait PurchaseRepoTrait: Send + Sync {
    /// Inserts unless a purchase for the session exists. Returns the stored row and whether it was created.
    async fn insert_if_absent(&self, input: &NewPurchase) -> AppResult<(PurchaseProfile, bool)>;
    async fn get_by_session(&self, checkout_session_id: &str) -> AppResult<Option<PurchaseProfile>>;
    async fn get_by_subscription(&self, subscription_id: &str) -> AppResult<Option<PurchaseProfile>>;
    /// Most recent purchase for an email.
    async fn latest_by_email(&self, email: &str) -> AppResult<Option<PurchaseProfile>>;
}

// ============================================================================
// Licenses
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct LicenseProfile {
    pub license_id: Uuid,
    pub purchaser_email: String,
    pub tier: Tier,
    pub stack_group_id: Uuid,
    pub checkout_session_id: String,
    /// 1-based position within the stack; unique per session.
    pub unit_index: i32,
    pub status: LicenseStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLicense {
    pub purchaser_email: String,
    pub tier: Tier,
    pub stack_group_id: Uuid,
    pub checkout_session_id: String,
    pub unit_index: i32,
}

#[async_trait]
pub trait LicenseRepoTrait: Send + Sync {
    async fn count_by_session(&self, checkout_session_id: &str) -> AppResult<i64>;
    /// Inserts the batch, skipping units that already exist. Returns the number inserted.
    async fn insert_many(&self, licenses: &[NewLicense]) -> AppResult<u64>;
    async fn list_by_session(&self, checkout_session_id: &str) -> AppResult<Vec<LicenseProfile>>;
}

// ============================================================================
// Installment payments
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallmentPaymentProfile {
    pub invoice_id: String,
    pub subscription_id: String,
    pub amount_paid_cents: i64,
    pub currency: String,
    pub paid_at: DateTime<Utc>,
}

#[async_trait]
pub trait InstallmentPaymentRepoTrait: Send + Sync {
    /// Returns `true` when the row was created.
    async fn insert_if_absent(&self, payment: &InstallmentPaymentProfile) -> AppResult<bool>;
    async fn list_by_subscription(&self, subscription_id: &str) -> AppResult<Vec<InstallmentPaymentProfile>>;
}

// ============================================================================
// Credit ledger
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditLedgerEntry {
    pub subscription_id: String,
    pub invoice_id: String,
    pub installment_index: i32,
    pub recipient_email: String,
    pub amount: i64,
    pub role: CreditRole,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait CreditLedgerRepoTrait: Send + Sync {
    async fn count_by_role(&self, subscription_id: &str, role: CreditRole) -> AppResult<i64>;
    async fn find_by_invoice(&self, invoice_id: &str, role: CreditRole) -> AppResult<Option<CreditLedgerEntry>>;
    /// Inserts unless (invoice, role) or (subscription, role, index) is taken.
    /// A created `Referrer` entry also adds its amount to the recipient's owner
    /// rollup in the same unit. Returns `true` when created.
    async fn insert_if_absent(&self, entry: &CreditLedgerEntry) -> AppResult<bool>;
    async fn list_by_subscription(&self, subscription_id: &str) -> AppResult<Vec<CreditLedgerEntry>>;
}
