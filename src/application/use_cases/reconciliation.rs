//! Turns at-least-once payment webhooks into exactly-once ledger effects.
//!
//! Each unit of work (a checkout session or an invoice) moves
//! `unseen -> in-flight -> done`. Acceptance is decided under one lock and the
//! pipeline runs on a background task, so webhook responses never wait on it.
//! The in-process tracker is only a fast path: every write below is keyed so
//! a replay after a restart is absorbed by the store's unique constraints.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::application::checkout::{CheckoutMetadata, MetadataMap};
use crate::application::ports::payment_provider::{CheckoutProviderPort, SubscriptionId};
use crate::application::use_cases::ledger::{
    CreditLedgerEntry, CreditLedgerRepoTrait, InstallmentPaymentProfile, InstallmentPaymentRepoTrait,
    LicenseRepoTrait, NewLicense, NewPurchase, PurchaseProfile, PurchaseRepoTrait,
};
use crate::application::use_cases::referral::{
    NewRedemption, RedemptionRepoTrait, RedemptionWrite, ReferralCodeRepoTrait,
};
use crate::application::validators::{normalize_code, normalize_email};
use crate::domain::entities::{
    credit_role::CreditRole, purchase_status::PurchaseStatus, redemption_source::RedemptionSource,
};
use crate::domain::pricing::proration::installment_award;

// ============================================================================
// Event inputs (provider-neutral)
// ============================================================================

#[derive(Debug, Clone)]
pub struct CheckoutCompletion {
    pub session_id: String,
    pub subscription_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub customer_id: Option<String>,
    pub email: Option<String>,
    pub customer_name: Option<String>,
    pub phone: Option<String>,
    pub amount_total_cents: Option<i64>,
    pub currency: Option<String>,
    pub metadata: MetadataMap,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct InvoicePayment {
    pub invoice_id: String,
    pub subscription_id: Option<String>,
    pub customer_email: Option<String>,
    pub amount_paid_cents: i64,
    pub currency: Option<String>,
    /// Subscription metadata when the event carries it; empty otherwise.
    pub subscription_metadata: MetadataMap,
    pub paid_at: DateTime<Utc>,
}

// ============================================================================
// Work tracking
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WorkKey {
    Checkout(String),
    Invoice(String),
}

impl std::fmt::Display for WorkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkKey::Checkout(id) => write!(f, "checkout:{id}"),
            WorkKey::Invoice(id) => write!(f, "invoice:{id}"),
        }
    }
}

/// What happened to a delivered event. Duplicates are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    Started,
    AlreadyInFlight,
    AlreadyDone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    Unseen,
    InFlight,
    Done,
}

#[derive(Default)]
struct WorkTracker {
    /// Never pruned. Past the provider's retry window a forgotten key only
    /// costs a replay, which the store's unique constraints absorb.
    done: HashSet<WorkKey>,
    /// `None` once a waiter has taken the handle to await it.
    in_flight: HashMap<WorkKey, Option<JoinHandle<()>>>,
}

// ============================================================================
// Reconciler
// ============================================================================

/// Repositories the pipelines write to.
#[derive(Clone)]
pub struct ReconcilerRepos {
    pub purchases: Arc<dyn PurchaseRepoTrait>,
    pub licenses: Arc<dyn LicenseRepoTrait>,
    pub codes: Arc<dyn ReferralCodeRepoTrait>,
    pub redemptions: Arc<dyn RedemptionRepoTrait>,
    pub installments: Arc<dyn InstallmentPaymentRepoTrait>,
    pub ledger: Arc<dyn CreditLedgerRepoTrait>,
}

#[derive(Clone)]
pub struct WebhookReconciler {
    pipeline: Arc<Pipeline>,
    tracker: Arc<Mutex<WorkTracker>>,
    permits: Arc<Semaphore>,
}

impl WebhookReconciler {
    pub fn new(
        repos: ReconcilerRepos,
        provider: Arc<dyn CheckoutProviderPort>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                repos,
                provider,
                subscription_gates: Mutex::new(HashMap::new()),
            }),
            tracker: Arc::new(Mutex::new(WorkTracker::default())),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    pub fn accept_checkout_completed(&self, completion: CheckoutCompletion) -> Acceptance {
        let key = WorkKey::Checkout(completion.session_id.clone());
        let span = info_span!("reconcile_checkout", session_id = %completion.session_id);
        let pipeline = self.pipeline.clone();
        self.dispatch(key, async move { pipeline.run_checkout(completion).await }.instrument(span))
    }

    pub fn accept_invoice_paid(&self, invoice: InvoicePayment) -> Acceptance {
        let key = WorkKey::Invoice(invoice.invoice_id.clone());
        let span = info_span!("reconcile_invoice", invoice_id = %invoice.invoice_id);
        let pipeline = self.pipeline.clone();
        self.dispatch(key, async move { pipeline.run_invoice(invoice).await }.instrument(span))
    }

    pub fn state_of(&self, key: &WorkKey) -> WorkState {
        let tracker = self.lock_tracker();
        if tracker.done.contains(key) {
            WorkState::Done
        } else if tracker.in_flight.contains_key(key) {
            WorkState::InFlight
        } else {
            WorkState::Unseen
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock_tracker().in_flight.len()
    }

    /// Awaits every tracked pipeline, including ones accepted while waiting.
    pub async fn wait_idle(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut tracker = self.lock_tracker();
                if tracker.in_flight.is_empty() {
                    return;
                }
                tracker.in_flight.values_mut().filter_map(Option::take).collect()
            };
            if handles.is_empty() {
                // Another waiter holds the handles.
                tokio::task::yield_now().await;
                continue;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    error!(error = %e, "Reconciliation tracker task failed");
                }
            }
        }
    }

    fn lock_tracker(&self) -> MutexGuard<'_, WorkTracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch<F>(&self, key: WorkKey, work: F) -> Acceptance
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tracker = self.lock_tracker();
        if tracker.done.contains(&key) {
            debug!(work = %key, "Event already reconciled, ignoring");
            return Acceptance::AlreadyDone;
        }
        if tracker.in_flight.contains_key(&key) {
            debug!(work = %key, "Event already in flight, ignoring");
            return Acceptance::AlreadyInFlight;
        }

        let permits = self.permits.clone();
        let tracker_ref = self.tracker.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            match permits.acquire_owned().await {
                Ok(_permit) => {
                    // Inner task so a panic still marks the unit done.
                    if let Err(e) = tokio::spawn(work).await {
                        error!(work = %task_key, error = %e, "Reconciliation task panicked");
                    }
                }
                Err(_) => error!(work = %task_key, "Reconciliation semaphore closed"),
            }
            let mut tracker = tracker_ref.lock().unwrap_or_else(PoisonError::into_inner);
            tracker.in_flight.remove(&task_key);
            tracker.done.insert(task_key);
        });

        tracker.in_flight.insert(key, Some(handle));
        Acceptance::Started
    }
}

// ============================================================================
// Pipelines
// ============================================================================

struct Pipeline {
    repos: ReconcilerRepos,
    provider: Arc<dyn CheckoutProviderPort>,
    /// Invoices of one subscription run one at a time so each sees the slots
    /// its predecessors claimed.
    subscription_gates: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Logs and swallows a failed step so later steps still run.
fn step<T>(name: &'static str, result: AppResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            error!(step = name, error = %e, "Reconciliation step failed");
            None
        }
    }
}

impl Pipeline {
    async fn run_checkout(&self, completion: CheckoutCompletion) {
        let metadata = match CheckoutMetadata::from_map(&completion.metadata) {
            Ok(metadata) => metadata,
            Err(e) => {
                error!(error = %e, "Checkout metadata unreadable, nothing to reconcile");
                return;
            }
        };

        let purchase = step("purchase", self.record_purchase(&completion, &metadata).await);

        if metadata.referral_code_used.is_some() {
            step("referral", self.record_referral(&completion, &metadata).await);
        }

        step(
            "licenses",
            self.top_up_licenses(&completion, &metadata, purchase.as_ref()).await,
        );

        if metadata.is_installment_plan() {
            step("schedule", self.limit_cycles(&completion, &metadata).await);
        }

        info!("Checkout reconciled");
    }

    async fn record_purchase(
        &self,
        completion: &CheckoutCompletion,
        metadata: &CheckoutMetadata,
    ) -> AppResult<PurchaseProfile> {
        let plan_total_cents = metadata
            .plan
            .map(|plan| plan.gross_cents)
            .or(completion.amount_total_cents)
            .unwrap_or(0);

        let input = NewPurchase {
            checkout_session_id: completion.session_id.clone(),
            subscription_id: completion.subscription_id.clone(),
            email: completion.email.as_deref().map(normalize_email).unwrap_or_default(),
            tier: metadata.tier,
            stack_count: metadata.stack_count as i32,
            installments: metadata.installments as i32,
            plan_total_cents,
            discount_pct: metadata.discount_pct as i32,
            base_credits: metadata.base_credits,
            bonus_credits: metadata.bonus_credits,
            referral_extra: metadata.referral_extra,
            referral_code_used: metadata.referral_code_used.as_deref().and_then(normalize_code),
            referral_owner_email: metadata.ref_owner_email.as_deref().map(normalize_email),
            payment_intent_id: completion.payment_intent_id.clone(),
            customer_id: completion.customer_id.clone(),
            customer_name: completion.customer_name.clone(),
            phone: completion.phone.clone(),
            currency: completion.currency.clone().unwrap_or_else(|| "usd".to_string()),
            status: PurchaseStatus::for_installments(metadata.installments),
            purchased_at: completion.completed_at,
        };

        let (purchase, created) = self.repos.purchases.insert_if_absent(&input).await?;
        if created {
            info!(purchase_id = %purchase.id, tier = %purchase.tier, "Purchase recorded");
        } else {
            debug!(purchase_id = %purchase.id, "Purchase already recorded");
        }
        Ok(purchase)
    }

    async fn record_referral(
        &self,
        completion: &CheckoutCompletion,
        metadata: &CheckoutMetadata,
    ) -> AppResult<()> {
        let Some(code) = metadata.referral_code_used.as_deref().and_then(normalize_code) else {
            return Ok(());
        };

        if self
            .repos
            .redemptions
            .exists_for_session(&completion.session_id)
            .await?
        {
            debug!("Redemption already recorded for session");
            return Ok(());
        }

        let purchaser_email = completion.email.as_deref().map(normalize_email).unwrap_or_default();
        let credit_value = metadata.referral_total();
        // Installment plans are credited per paid invoice instead.
        let owner_credits = if metadata.is_installment_plan() { 0 } else { credit_value };

        let write = self
            .repos
            .redemptions
            .redeem_code(&NewRedemption {
                code: code.clone(),
                purchaser_email,
                tier_purchased: metadata.tier,
                credit_value,
                checkout_session_id: completion.session_id.clone(),
                discount_pct_applied: metadata.discount_pct as i32,
                source: RedemptionSource::Checkout,
                redeemed_ts: completion.completed_at,
                owner_credits,
            })
            .await?;

        match write {
            RedemptionWrite::Recorded(redemption) => {
                info!(code = %redemption.code, credits = owner_credits, "Referral redemption recorded")
            }
            RedemptionWrite::SessionTaken => debug!("Redemption already recorded for session"),
            RedemptionWrite::Unclaimable => {
                warn!(code = %code, "Referral code no longer claimable; skipping redemption")
            }
        }
        Ok(())
    }

    async fn top_up_licenses(
        &self,
        completion: &CheckoutCompletion,
        metadata: &CheckoutMetadata,
        purchase: Option<&PurchaseProfile>,
    ) -> AppResult<()> {
        let existing = self
            .repos
            .licenses
            .count_by_session(&completion.session_id)
            .await?;
        let wanted = i64::from(metadata.stack_count);
        if existing >= wanted {
            debug!(existing, "Licenses already issued");
            return Ok(());
        }

        let purchase = match purchase {
            Some(p) => Some(p.clone()),
            None => self
                .repos
                .purchases
                .get_by_session(&completion.session_id)
                .await
                .unwrap_or(None),
        };
        let stack_group_id = match &purchase {
            Some(p) => p.id,
            None => {
                let fallback = Uuid::new_v4();
                warn!(stack_group_id = %fallback, "No purchase row; grouping licenses under a fresh id");
                fallback
            }
        };
        let purchaser_email = purchase
            .map(|p| p.email)
            .or_else(|| completion.email.as_deref().map(normalize_email))
            .unwrap_or_default();

        let shortfall: Vec<NewLicense> = (existing + 1..=wanted)
            .map(|unit| NewLicense {
                purchaser_email: purchaser_email.clone(),
                tier: metadata.tier,
                stack_group_id,
                checkout_session_id: completion.session_id.clone(),
                unit_index: unit as i32,
            })
            .collect();

        let inserted = self.repos.licenses.insert_many(&shortfall).await?;
        info!(inserted, wanted, "Licenses issued");
        Ok(())
    }

    async fn limit_cycles(
        &self,
        completion: &CheckoutCompletion,
        metadata: &CheckoutMetadata,
    ) -> AppResult<()> {
        let subscription = completion.subscription_id.as_deref().ok_or_else(|| {
            AppError::InvalidInput("installment checkout completed without a subscription".into())
        })?;
        self.provider
            .limit_subscription_cycles(&SubscriptionId::new(subscription), metadata.installments)
            .await?;
        info!(subscription_id = %subscription, cycles = metadata.installments, "Subscription schedule attached");
        Ok(())
    }

    async fn run_invoice(&self, invoice: InvoicePayment) {
        let Some(subscription_id) = invoice.subscription_id.clone() else {
            debug!("Invoice has no subscription, ignoring");
            return;
        };

        let metadata_map = if invoice.subscription_metadata.is_empty() {
            match self
                .provider
                .get_subscription_metadata(&SubscriptionId::new(subscription_id.as_str()))
                .await
            {
                Ok(map) => map,
                Err(e) => {
                    error!(step = "metadata", error = %e, "Could not load subscription metadata");
                    return;
                }
            }
        } else {
            invoice.subscription_metadata.clone()
        };

        let metadata = match CheckoutMetadata::from_map(&metadata_map) {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!(error = %e, "Subscription is not an installment plan we issued, ignoring");
                return;
            }
        };
        if !metadata.is_installment_plan() {
            debug!("Subscription is not an installment plan, ignoring");
            return;
        }

        let gate = self.gate_for(&subscription_id);
        {
            let _turn = gate.lock().await;
            step("installment", self.record_installment(&invoice, &subscription_id).await);
            step(
                "referral_credit",
                self.award_installment_credit(&invoice, &subscription_id, &metadata).await,
            );
        }
        self.release_gate(&subscription_id, gate);
    }

    fn gate_for(&self, subscription_id: &str) -> Arc<AsyncMutex<()>> {
        self.subscription_gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(subscription_id.to_string())
            .or_default()
            .clone()
    }

    fn release_gate(&self, subscription_id: &str, gate: Arc<AsyncMutex<()>>) {
        let mut gates = self.subscription_gates.lock().unwrap_or_else(PoisonError::into_inner);
        // Clones are only made under this lock, so 2 means the map and this caller.
        if Arc::strong_count(&gate) == 2 {
            gates.remove(subscription_id);
        }
    }

    async fn record_installment(&self, invoice: &InvoicePayment, subscription_id: &str) -> AppResult<()> {
        let created = self
            .repos
            .installments
            .insert_if_absent(&InstallmentPaymentProfile {
                invoice_id: invoice.invoice_id.clone(),
                subscription_id: subscription_id.to_string(),
                amount_paid_cents: invoice.amount_paid_cents,
                currency: invoice.currency.clone().unwrap_or_else(|| "usd".to_string()),
                paid_at: invoice.paid_at,
            })
            .await?;
        if created {
            info!(amount_paid_cents = invoice.amount_paid_cents, "Installment payment recorded");
        }
        Ok(())
    }

    async fn award_installment_credit(
        &self,
        invoice: &InvoicePayment,
        subscription_id: &str,
        metadata: &CheckoutMetadata,
    ) -> AppResult<()> {
        let Some(code) = metadata.referral_code_used.as_deref().and_then(normalize_code) else {
            return Ok(());
        };
        let total = metadata.referral_total();
        if total <= 0 {
            return Ok(());
        }

        let purchase = self
            .repos
            .purchases
            .get_by_subscription(subscription_id)
            .await?;
        let owner = match metadata
            .ref_owner_email
            .as_deref()
            .map(normalize_email)
            .or_else(|| purchase.as_ref().and_then(|p| p.referral_owner_email.clone()))
        {
            Some(owner) => Some(owner),
            None => self.repos.codes.find_code(&code).await?.map(|c| c.owner_email),
        };
        let referee = invoice
            .customer_email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty())
            .or_else(|| purchase.as_ref().map(|p| p.email.clone()).filter(|e| !e.is_empty()));

        if owner.is_none() {
            warn!(code = %code, "Referral owner unknown; referrer credit skipped");
        }
        if referee.is_none() {
            warn!("Referee email unknown; referee credit skipped");
        }

        // The first recipient's row claims the installment slot; the other
        // mirrors it.
        let (slot_role, slot_recipient, mirror) = match (owner, referee) {
            (Some(owner), referee) => (CreditRole::Referrer, owner, referee),
            (None, Some(referee)) => (CreditRole::Referee, referee, None),
            (None, None) => return Ok(()),
        };

        let entry = |recipient_email: String, role: CreditRole, index: u32, amount: i64| {
            CreditLedgerEntry {
                subscription_id: subscription_id.to_string(),
                invoice_id: invoice.invoice_id.clone(),
                installment_index: index as i32,
                recipient_email,
                amount,
                role,
                created_at: invoice.paid_at,
            }
        };

        let mut attempts = 0;
        let (index, amount) = loop {
            if let Some(existing) = self
                .repos
                .ledger
                .find_by_invoice(&invoice.invoice_id, slot_role)
                .await?
            {
                debug!(index = existing.installment_index, "Installment slot already claimed by this invoice");
                break (existing.installment_index.max(0) as u32, existing.amount);
            }

            let paid = self
                .repos
                .ledger
                .count_by_role(subscription_id, slot_role)
                .await?;
            let index = paid.max(0) as u32 + 1;
            let Some(amount) = installment_award(total, metadata.installments, index) else {
                info!(index, installments = metadata.installments, "All installment credits already awarded");
                return Ok(());
            };

            if self
                .repos
                .ledger
                .insert_if_absent(&entry(slot_recipient.clone(), slot_role, index, amount))
                .await?
            {
                info!(index, amount, role = ?slot_role, "Installment credit awarded");
                break (index, amount);
            }

            // Another process took this slot between the count and the insert.
            attempts += 1;
            if attempts > metadata.installments {
                return Err(AppError::Internal("could not claim an installment credit slot".into()));
            }
            debug!(index, "Installment slot taken, recounting");
        };

        if let Some(referee) = mirror {
            if self
                .repos
                .ledger
                .insert_if_absent(&entry(referee, CreditRole::Referee, index, amount))
                .await?
            {
                info!(index, amount, "Referee installment credit awarded");
            }
        }

        Ok(())
    }
}
