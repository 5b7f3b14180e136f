use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    app_error::AppResult,
    application::checkout::{CheckoutRequest, MetadataMap},
};

// ============================================================================
// Port Types - Provider-agnostic domain types
// ============================================================================

/// Unique identifier for a subscription in a payment provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A hosted checkout page the customer is redirected to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

// ============================================================================
// Port
// ============================================================================

/// Checkout provider port.
///
/// Session creation, subscription scheduling and metadata lookup are the only
/// provider operations the engine needs; everything else stays behind the adapter.
#[async_trait]
pub trait CheckoutProviderPort: Send + Sync {
    /// Create a hosted checkout session for a one-time charge or a recurring plan.
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> AppResult<CheckoutSession>;

    /// Limit a subscription to exactly `cycles` paid periods, then cancel.
    /// Calling it again for the same subscription must leave the same schedule.
    async fn limit_subscription_cycles(&self, subscription: &SubscriptionId, cycles: u32) -> AppResult<()>;

    /// Metadata copied onto the subscription at checkout.
    async fn get_subscription_metadata(&self, subscription: &SubscriptionId) -> AppResult<MetadataMap>;
}
