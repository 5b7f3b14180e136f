use std::net::SocketAddr;

use axum::http::HeaderValue;
use chrono::{DateTime, Utc};
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use url::Url;

use crate::domain::pricing::config::{BonusPolicy, DiscountPolicy, PricingConfig, ReferralPolicy};

pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub cors_origin: HeaderValue,
    /// Public site the checkout success and cancel pages live on.
    pub app_base: Url,
    pub stripe_secret_key: SecretString,
    pub stripe_webhook_secret: SecretString,
    /// Keys the HMAC that mints referral codes.
    pub referral_code_secret: SecretString,
    /// Upper bound on webhook pipelines running at once.
    pub reconcile_concurrency: usize,
    pub max_stack_count: u32,
    /// JSON log file. Console-only logging when unset.
    pub log_file: Option<String>,
    /// Initial pricing knobs; the live value is held by `PricingConfigStore`.
    pub pricing: PricingConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let bind_addr: SocketAddr = get_env_default("BIND_ADDR", "127.0.0.1:4242".parse().unwrap());
        let database_url: String = get_env("DATABASE_URL");
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .expect("CORS_ORIGIN must be a valid header value");
        let app_base: Url = get_env("APP_BASE");

        let stripe_secret_key = SecretString::new(get_env::<String>("STRIPE_SECRET_KEY").into());
        let stripe_webhook_secret =
            SecretString::new(get_env::<String>("STRIPE_ENDPOINT_SECRET").into());
        let referral_code_secret =
            SecretString::new(get_env::<String>("REFERRAL_CODE_SECRET").into());

        let reconcile_concurrency: usize = get_env_default("RECONCILE_CONCURRENCY", 8);
        let max_stack_count: u32 = get_env_default("MAX_STACK_COUNT", 10);
        let log_file: Option<String> = optional_env("LOG_FILE");

        Self {
            bind_addr,
            database_url,
            cors_origin,
            app_base,
            stripe_secret_key,
            stripe_webhook_secret,
            referral_code_secret,
            reconcile_concurrency,
            max_stack_count,
            log_file,
            pricing: pricing_from_env(),
        }
    }
}

fn optional_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| v.trim().parse().ok())
}

fn pricing_from_env() -> PricingConfig {
    let defaults = PricingConfig::default();
    let discount = DiscountPolicy::default();
    let bonus = BonusPolicy::default();
    let referral = ReferralPolicy::default();

    // RFC 3339, e.g. 2025-07-27T00:00:00-06:00
    let launch_at: DateTime<Utc> = optional_env("LAUNCH_AT").unwrap_or(defaults.launch_at);

    PricingConfig {
        launch_at,
        discount: DiscountPolicy {
            start_pct: get_env_default("DISCOUNT_START_PCT", discount.start_pct),
            floor_pct: get_env_default("DISCOUNT_FLOOR_PCT", discount.floor_pct),
            daily_decrement: get_env_default("DISCOUNT_DAILY_DECREMENT", discount.daily_decrement),
            override_pct: optional_env("DISCOUNT_OVERRIDE_PCT"),
            hold: get_env_default("DISCOUNT_HOLD", discount.hold),
        },
        bonus: BonusPolicy {
            daily_decay_rate: get_env_default("BONUS_DAILY_DECAY", bonus.daily_decay_rate),
            override_pct_of_base: optional_env("BONUS_OVERRIDE_PCT"),
            hold: get_env_default("BONUS_HOLD", bonus.hold),
        },
        referral: ReferralPolicy {
            discount_pct: get_env_default("REFERRAL_DISCOUNT_PCT", referral.discount_pct),
            credit_pct: get_env_default("REFERRAL_CREDIT_PCT", referral.credit_pct),
        },
        banner_text: optional_env("BANNER_TEXT"),
        ..defaults
    }
}
