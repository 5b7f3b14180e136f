use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use crate::app_error::{AppError, AppResult};
use crate::application::checkout::{CheckoutRequest, CheckoutUrls};
use crate::application::ports::payment_provider::{CheckoutProviderPort, CheckoutSession};
use crate::application::use_cases::referral::ReferralUseCases;
use crate::domain::entities::tier::Tier;
use crate::domain::pricing::{BonusEngine, DiscountClock, PricingConfig, PricingQuote};

/// Holds the current pricing config. Readers get an immutable snapshot;
/// every replacement bumps the version.
#[derive(Debug)]
pub struct PricingConfigStore {
    current: RwLock<Arc<PricingConfig>>,
}

impl PricingConfigStore {
    pub fn new(config: PricingConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub fn current(&self) -> Arc<PricingConfig> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn revise(&self, change: impl FnOnce(&mut PricingConfig)) -> Arc<PricingConfig> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = Arc::new(guard.revised(change));
        *guard = next.clone();
        info!(version = next.version, "Pricing config revised");
        next
    }
}

#[derive(Debug, Clone)]
pub struct QuoteInput {
    pub tier: String,
    pub referral_code: Option<String>,
    pub stack_count: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct CheckoutInput {
    pub quote: QuoteInput,
    pub installments: u32,
    pub promo_code: Option<String>,
}

#[derive(Clone)]
pub struct PricingUseCases {
    referrals: Arc<ReferralUseCases>,
    provider: Arc<dyn CheckoutProviderPort>,
    clock: Arc<DiscountClock>,
    bonus: Arc<BonusEngine>,
    urls: CheckoutUrls,
    max_stack_count: u32,
}

impl PricingUseCases {
    pub fn new(
        referrals: Arc<ReferralUseCases>,
        provider: Arc<dyn CheckoutProviderPort>,
        urls: CheckoutUrls,
        max_stack_count: u32,
    ) -> Self {
        Self {
            referrals,
            provider,
            clock: Arc::new(DiscountClock::new()),
            bonus: Arc::new(BonusEngine::new()),
            urls,
            max_stack_count: max_stack_count.max(1),
        }
    }

    /// Prices one request: clock, then bonus, then referral, then plans.
    #[instrument(skip(self, config), fields(config_version = config.version))]
    pub async fn quote(
        &self,
        input: &QuoteInput,
        config: &PricingConfig,
        now: DateTime<Utc>,
    ) -> AppResult<PricingQuote> {
        let tier = Tier::from_key(&input.tier)
            .ok_or_else(|| AppError::InvalidTier(input.tier.trim().to_string()))?;
        let stack_count = self.stack_count(input.stack_count)?;

        let clock_pct = self.clock.current_pct(now, config);
        let bonus_credits = self.bonus.current_credits(tier, now, config);
        let referral = self.referrals.validate(input.referral_code.as_deref()).await?;

        Ok(PricingQuote::compute(
            tier,
            stack_count,
            clock_pct,
            bonus_credits,
            referral,
            config,
        ))
    }

    #[instrument(skip(self, config), fields(config_version = config.version))]
    pub async fn start_checkout(
        &self,
        input: &CheckoutInput,
        config: &PricingConfig,
        now: DateTime<Utc>,
    ) -> AppResult<CheckoutSession> {
        let quote = self.quote(&input.quote, config, now).await?;
        let request = CheckoutRequest::build(
            &quote,
            input.installments.max(1),
            input.promo_code.clone(),
            self.urls.clone(),
        )?;

        let session = self.provider.create_checkout_session(&request).await?;
        info!(
            session_id = %session.id,
            tier = %quote.tier,
            installments = request.metadata.installments,
            referral = quote.referral.valid,
            "Checkout session created"
        );
        Ok(session)
    }

    fn stack_count(&self, requested: Option<i64>) -> AppResult<u32> {
        let requested = requested.unwrap_or(1).max(1);
        if requested > i64::from(self.max_stack_count) {
            return Err(AppError::InvalidInput(format!(
                "stackCount must be at most {}",
                self.max_stack_count
            )));
        }
        Ok(requested as u32)
    }
}
