//! In-memory checkout provider that records what the engine asked for.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        checkout::{CheckoutRequest, MetadataMap},
        ports::payment_provider::{CheckoutProviderPort, CheckoutSession, SubscriptionId},
    },
};

#[derive(Default)]
pub struct InMemoryCheckoutProvider {
    pub requests: Mutex<Vec<CheckoutRequest>>,
    pub cycle_limits: Mutex<Vec<(String, u32)>>,
    pub subscription_metadata: Mutex<HashMap<String, MetadataMap>>,
    /// Every call fails as if the provider were unreachable.
    pub fail: bool,
}

impl InMemoryCheckoutProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn cycle_limits(&self) -> Vec<(String, u32)> {
        self.cycle_limits.lock().unwrap().clone()
    }

    pub fn set_subscription_metadata(&self, subscription_id: &str, metadata: MetadataMap) {
        self.subscription_metadata
            .lock()
            .unwrap()
            .insert(subscription_id.to_string(), metadata);
    }

    fn check(&self) -> AppResult<()> {
        if self.fail {
            Err(AppError::UpstreamUnavailable("provider offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CheckoutProviderPort for InMemoryCheckoutProvider {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> AppResult<CheckoutSession> {
        self.check()?;
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        let id = format!("cs_test_{}", requests.len());
        Ok(CheckoutSession {
            url: format!("https://checkout.example.com/pay/{id}"),
            id,
        })
    }

    async fn limit_subscription_cycles(&self, subscription: &SubscriptionId, cycles: u32) -> AppResult<()> {
        self.check()?;
        let mut limits = self.cycle_limits.lock().unwrap();
        let key = subscription.as_str().to_string();
        match limits.iter_mut().find(|(id, _)| *id == key) {
            Some(existing) => existing.1 = cycles,
            None => limits.push((key, cycles)),
        }
        Ok(())
    }

    async fn get_subscription_metadata(&self, subscription: &SubscriptionId) -> AppResult<MetadataMap> {
        self.check()?;
        self.subscription_metadata
            .lock()
            .unwrap()
            .get(subscription.as_str())
            .cloned()
            .ok_or(AppError::NotFound)
    }
}
