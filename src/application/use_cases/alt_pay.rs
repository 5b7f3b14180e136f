use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::app_error::{AppError, AppResult};
use crate::application::validators::{is_valid_email, normalize_code, normalize_email};
use crate::domain::entities::tier::Tier;
use crate::domain::pricing::installments::MAX_INSTALLMENTS;

const REFERENCE_PREFIX: &str = "ALT-";
const REFERENCE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const REFERENCE_LEN: usize = 8;
const MAX_REFERENCE_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, Serialize)]
pub struct AltPayRequestProfile {
    pub reference: String,
    pub tier: Tier,
    pub stack_count: i32,
    pub installments: i32,
    pub email: String,
    pub phone: Option<String>,
    pub method: String,
    pub other_method: Option<String>,
    pub referral_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait AltPayRepoTrait: Send + Sync {
    /// Returns `false` when the reference is already taken.
    async fn insert_if_absent(&self, request: &AltPayRequestProfile) -> AppResult<bool>;
}

#[derive(Debug, Clone, Default)]
pub struct AltPayInput {
    pub tier: String,
    pub stack_count: Option<i64>,
    pub installments: Option<i64>,
    pub email: String,
    pub phone: Option<String>,
    pub method: Option<String>,
    pub other_method: Option<String>,
    pub referral_code: Option<String>,
}

fn new_reference() -> String {
    let mut rng = rand::thread_rng();
    let token: String = (0..REFERENCE_LEN)
        .map(|_| REFERENCE_ALPHABET[rng.gen_range(0..REFERENCE_ALPHABET.len())] as char)
        .collect();
    format!("{REFERENCE_PREFIX}{token}")
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Records requests to pay by a method the checkout provider doesn't cover.
#[derive(Clone)]
pub struct AltPayUseCases {
    repo: Arc<dyn AltPayRepoTrait>,
    max_stack_count: u32,
}

impl AltPayUseCases {
    pub fn new(repo: Arc<dyn AltPayRepoTrait>, max_stack_count: u32) -> Self {
        Self {
            repo,
            max_stack_count: max_stack_count.max(1),
        }
    }

    #[instrument(skip(self, input), fields(tier = %input.tier))]
    pub async fn submit(&self, input: &AltPayInput, now: DateTime<Utc>) -> AppResult<AltPayRequestProfile> {
        let tier = Tier::from_key(&input.tier)
            .ok_or_else(|| AppError::InvalidTier(input.tier.trim().to_string()))?;

        let email = normalize_email(&input.email);
        if !is_valid_email(&email) {
            return Err(AppError::InvalidInput("Invalid email format".into()));
        }

        let installments = input.installments.unwrap_or(1);
        if !(1..=i64::from(MAX_INSTALLMENTS)).contains(&installments) {
            return Err(AppError::InvalidInput(format!(
                "installments must be between 1 and {MAX_INSTALLMENTS}"
            )));
        }

        let stack_count = input.stack_count.unwrap_or(1);
        if !(1..=i64::from(self.max_stack_count)).contains(&stack_count) {
            return Err(AppError::InvalidInput(format!(
                "stackCount must be between 1 and {}",
                self.max_stack_count
            )));
        }

        let method = non_blank(input.method.as_deref()).unwrap_or_else(|| "other".to_string());
        let other_method = if method == "other" {
            non_blank(input.other_method.as_deref())
        } else {
            None
        };

        for attempt in 0..MAX_REFERENCE_ATTEMPTS {
            let request = AltPayRequestProfile {
                reference: new_reference(),
                tier,
                stack_count: stack_count as i32,
                installments: installments as i32,
                email: email.clone(),
                phone: non_blank(input.phone.as_deref()),
                method: method.clone(),
                other_method: other_method.clone(),
                referral_code: input.referral_code.as_deref().and_then(normalize_code),
                created_at: now,
            };

            if self.repo.insert_if_absent(&request).await? {
                info!(reference = %request.reference, method = %request.method, "Alternate payment request recorded");
                return Ok(request);
            }
            warn!(attempt, "Alternate payment reference collided, retrying");
        }

        Err(AppError::Internal("could not allocate an alternate payment reference".into()))
    }
}
