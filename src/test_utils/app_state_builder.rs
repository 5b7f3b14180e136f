//! Test app state builder for HTTP-level integration testing.
//!
//! `TestAppStateBuilder` wires the real use cases over in-memory mocks. The
//! mocks stay reachable through the builder so tests can seed and inspect them.

use std::sync::Arc;

use axum::http::HeaderValue;
use secrecy::SecretString;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    application::{
        checkout::CheckoutUrls,
        use_cases::{
            alt_pay::AltPayUseCases,
            ledger::PurchaseProfile,
            pricing::{PricingConfigStore, PricingUseCases},
            reconciliation::{ReconcilerRepos, WebhookReconciler},
            referral::{ReferralCodeProfile, ReferralUseCases},
        },
    },
    domain::pricing::PricingConfig,
    infra::config::AppConfig,
    test_utils::{
        InMemoryAltPayRepo, InMemoryCheckoutProvider, InMemoryCreditLedgerRepo,
        InMemoryInstallmentPaymentRepo, InMemoryLicenseRepo, InMemoryPurchaseRepo,
        InMemoryRedemptionRepo, InMemoryReferralCodeRepo,
    },
};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";
const TEST_MAX_STACK_COUNT: u32 = 10;

pub fn create_test_config(pricing: PricingConfig) -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        database_url: "postgres://localhost/ltd_billing_test".to_string(),
        cors_origin: HeaderValue::from_static("http://localhost:3000"),
        app_base: Url::parse("https://deal.example.com").unwrap(),
        stripe_secret_key: SecretString::new("sk_test_dummy".into()),
        stripe_webhook_secret: SecretString::new(TEST_WEBHOOK_SECRET.into()),
        referral_code_secret: SecretString::new("test_referral_secret".into()),
        reconcile_concurrency: 4,
        max_stack_count: TEST_MAX_STACK_COUNT,
        log_file: None,
        pricing,
    }
}

pub struct TestAppStateBuilder {
    codes: Arc<InMemoryReferralCodeRepo>,
    redemptions: Arc<InMemoryRedemptionRepo>,
    purchases: Arc<InMemoryPurchaseRepo>,
    licenses: Arc<InMemoryLicenseRepo>,
    installments: Arc<InMemoryInstallmentPaymentRepo>,
    ledger: Arc<InMemoryCreditLedgerRepo>,
    alt_pay: Arc<InMemoryAltPayRepo>,
    provider: Arc<InMemoryCheckoutProvider>,
    pricing: PricingConfig,
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        let codes = Arc::new(InMemoryReferralCodeRepo::new());
        Self {
            redemptions: Arc::new(InMemoryRedemptionRepo::new(codes.clone())),
            purchases: Arc::new(InMemoryPurchaseRepo::new()),
            licenses: Arc::new(InMemoryLicenseRepo::new()),
            installments: Arc::new(InMemoryInstallmentPaymentRepo::new()),
            ledger: Arc::new(InMemoryCreditLedgerRepo::new(codes.clone())),
            codes,
            alt_pay: Arc::new(InMemoryAltPayRepo::new()),
            provider: Arc::new(InMemoryCheckoutProvider::new()),
            pricing: PricingConfig::default(),
        }
    }

    pub fn with_code(self, code: ReferralCodeProfile) -> Self {
        self.codes.add(code);
        self
    }

    pub fn with_purchase(self, purchase: PurchaseProfile) -> Self {
        self.purchases.add(purchase);
        self
    }

    pub fn with_provider(mut self, provider: Arc<InMemoryCheckoutProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_pricing(mut self, change: impl FnOnce(&mut PricingConfig)) -> Self {
        change(&mut self.pricing);
        self
    }

    pub fn provider(&self) -> Arc<InMemoryCheckoutProvider> {
        self.provider.clone()
    }

    pub fn purchases(&self) -> Arc<InMemoryPurchaseRepo> {
        self.purchases.clone()
    }

    pub fn licenses(&self) -> Arc<InMemoryLicenseRepo> {
        self.licenses.clone()
    }

    pub fn codes(&self) -> Arc<InMemoryReferralCodeRepo> {
        self.codes.clone()
    }

    pub fn alt_pay(&self) -> Arc<InMemoryAltPayRepo> {
        self.alt_pay.clone()
    }

    pub fn build(&self) -> AppState {
        let config = create_test_config(self.pricing.clone());

        let referral_use_cases = Arc::new(ReferralUseCases::new(
            self.codes.clone(),
            self.redemptions.clone(),
            self.purchases.clone(),
            config.referral_code_secret.clone(),
        ));

        let pricing_use_cases = PricingUseCases::new(
            referral_use_cases.clone(),
            self.provider.clone(),
            CheckoutUrls::from_app_base(&config.app_base),
            config.max_stack_count,
        );

        let reconciler = WebhookReconciler::new(
            ReconcilerRepos {
                purchases: self.purchases.clone(),
                licenses: self.licenses.clone(),
                codes: self.codes.clone(),
                redemptions: self.redemptions.clone(),
                installments: self.installments.clone(),
                ledger: self.ledger.clone(),
            },
            self.provider.clone(),
            config.reconcile_concurrency,
        );

        let alt_pay_use_cases = AltPayUseCases::new(self.alt_pay.clone(), config.max_stack_count);

        AppState {
            pricing_config: Arc::new(PricingConfigStore::new(self.pricing.clone())),
            config: Arc::new(config),
            pricing_use_cases: Arc::new(pricing_use_cases),
            referral_use_cases,
            reconciler,
            alt_pay_use_cases: Arc::new(alt_pay_use_cases),
        }
    }
}
