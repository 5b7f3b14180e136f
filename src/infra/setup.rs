use crate::{
    adapters::http::app_state::AppState,
    application::{
        checkout::CheckoutUrls,
        ports::payment_provider::CheckoutProviderPort,
        use_cases::{
            alt_pay::{AltPayRepoTrait, AltPayUseCases},
            ledger::{
                CreditLedgerRepoTrait, InstallmentPaymentRepoTrait, LicenseRepoTrait,
                PurchaseRepoTrait,
            },
            pricing::{PricingConfigStore, PricingUseCases},
            reconciliation::{ReconcilerRepos, WebhookReconciler},
            referral::{RedemptionRepoTrait, ReferralCodeRepoTrait, ReferralUseCases},
        },
    },
    infra::{config::AppConfig, postgres_persistence, stripe_checkout_adapter::StripeCheckoutAdapter},
};
use std::fs::File;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub async fn init_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let postgres_arc = Arc::new(postgres_persistence(&config.database_url).await?);

    let provider: Arc<dyn CheckoutProviderPort> =
        Arc::new(StripeCheckoutAdapter::new(config.stripe_secret_key.clone()));

    let purchase_repo_arc = postgres_arc.clone() as Arc<dyn PurchaseRepoTrait>;
    let code_repo_arc = postgres_arc.clone() as Arc<dyn ReferralCodeRepoTrait>;
    let redemption_repo_arc = postgres_arc.clone() as Arc<dyn RedemptionRepoTrait>;

    let referral_use_cases = Arc::new(ReferralUseCases::new(
        code_repo_arc.clone(),
        redemption_repo_arc.clone(),
        purchase_repo_arc.clone(),
        config.referral_code_secret.clone(),
    ));

    let pricing_use_cases = PricingUseCases::new(
        referral_use_cases.clone(),
        provider.clone(),
        CheckoutUrls::from_app_base(&config.app_base),
        config.max_stack_count,
    );

    let reconciler = WebhookReconciler::new(
        ReconcilerRepos {
            purchases: purchase_repo_arc,
            licenses: postgres_arc.clone() as Arc<dyn LicenseRepoTrait>,
            codes: code_repo_arc,
            redemptions: redemption_repo_arc,
            installments: postgres_arc.clone() as Arc<dyn InstallmentPaymentRepoTrait>,
            ledger: postgres_arc.clone() as Arc<dyn CreditLedgerRepoTrait>,
        },
        provider,
        config.reconcile_concurrency,
    );

    let alt_pay_use_cases = AltPayUseCases::new(
        postgres_arc.clone() as Arc<dyn AltPayRepoTrait>,
        config.max_stack_count,
    );

    let pricing_config = Arc::new(PricingConfigStore::new(config.pricing.clone()));

    Ok(AppState {
        config: Arc::new(config),
        pricing_config,
        pricing_use_cases: Arc::new(pricing_use_cases),
        referral_use_cases,
        reconciler,
        alt_pay_use_cases: Arc::new(alt_pay_use_cases),
    })
}

pub fn init_tracing(log_file: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ltd_billing=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .pretty();

    // File (structured JSON logs), only when configured
    let json_layer = log_file.and_then(|path| match File::create(path) {
        Ok(file) => Some(
            fmt::layer()
                .json()
                .with_writer(file)
                .with_current_span(true)
                .with_span_list(true),
        ),
        Err(e) => {
            eprintln!("cannot create log file {path}: {e}");
            None
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
