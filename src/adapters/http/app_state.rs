use std::sync::Arc;

use crate::{
    infra::config::AppConfig,
    use_cases::{
        alt_pay::AltPayUseCases,
        pricing::{PricingConfigStore, PricingUseCases},
        reconciliation::WebhookReconciler,
        referral::ReferralUseCases,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub pricing_config: Arc<PricingConfigStore>,
    pub pricing_use_cases: Arc<PricingUseCases>,
    pub referral_use_cases: Arc<ReferralUseCases>,
    pub reconciler: WebhookReconciler,
    pub alt_pay_use_cases: Arc<AltPayUseCases>,
}
