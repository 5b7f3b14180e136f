use async_trait::async_trait;
use secrecy::SecretString;
use tracing::{debug, info};

use crate::{
    app_error::{AppError, AppResult},
    application::{
        checkout::{CheckoutCharge, CheckoutRequest, MetadataMap},
        ports::payment_provider::{CheckoutProviderPort, CheckoutSession, SubscriptionId},
    },
    infra::stripe_client::{
        FormParams, StripeClient, StripeSubscription, StripeSubscriptionSchedule,
    },
};

/// Adapter that wraps StripeClient to implement CheckoutProviderPort.
#[derive(Clone)]
pub struct StripeCheckoutAdapter {
    client: StripeClient,
}

impl StripeCheckoutAdapter {
    pub fn new(secret_key: SecretString) -> Self {
        Self {
            client: StripeClient::new(secret_key),
        }
    }
}

fn push(params: &mut FormParams, key: impl Into<String>, value: impl Into<String>) {
    params.push((key.into(), value.into()));
}

/// Form body for `POST /checkout/sessions`.
pub fn checkout_session_params(request: &CheckoutRequest) -> FormParams {
    let mut params = FormParams::new();
    let metadata = request.metadata.to_map();

    match &request.charge {
        CheckoutCharge::OneTime {
            unit_amount_cents,
            quantity,
        } => {
            push(&mut params, "mode", "payment");
            push(&mut params, "line_items[0][quantity]", quantity.to_string());
            push(&mut params, "line_items[0][price_data][unit_amount]", unit_amount_cents.to_string());
        }
        CheckoutCharge::Recurring { amount_cents, .. } => {
            push(&mut params, "mode", "subscription");
            push(&mut params, "line_items[0][quantity]", "1");
            push(&mut params, "line_items[0][price_data][unit_amount]", amount_cents.to_string());
            push(&mut params, "line_items[0][price_data][recurring][interval]", "month");
            // Invoices only carry subscription metadata.
            for (key, value) in &metadata {
                push(&mut params, format!("subscription_data[metadata][{key}]"), value.clone());
            }
        }
    }
    push(&mut params, "line_items[0][price_data][currency]", request.currency);
    push(&mut params, "line_items[0][price_data][product]", request.product_id);

    for (key, value) in &metadata {
        push(&mut params, format!("metadata[{key}]"), value.clone());
    }

    if request.collect_phone {
        push(&mut params, "phone_number_collection[enabled]", "true");
    }

    // Stripe rejects explicit discounts together with allow_promotion_codes.
    match &request.promo_code {
        Some(code) => push(&mut params, "discounts[0][promotion_code]", code.clone()),
        None => push(&mut params, "allow_promotion_codes", "true"),
    }

    push(&mut params, "success_url", request.urls.success_url.clone());
    push(&mut params, "cancel_url", request.urls.cancel_url.clone());
    params
}

/// One phase that repeats the subscription's current item `cycles` times, then cancels.
pub fn cycle_limit_params(
    subscription: &StripeSubscription,
    schedule: &StripeSubscriptionSchedule,
    cycles: u32,
) -> AppResult<FormParams> {
    let item = subscription.items.data.first().ok_or_else(|| {
        AppError::UpstreamUnavailable(format!("subscription {} has no items", subscription.id))
    })?;
    let start_date = schedule
        .phases
        .first()
        .map(|phase| phase.start_date)
        .ok_or_else(|| AppError::UpstreamUnavailable(format!("schedule {} has no phases", schedule.id)))?;

    let mut params = FormParams::new();
    push(&mut params, "end_behavior", "cancel");
    push(&mut params, "phases[0][items][0][price]", item.price.id());
    push(&mut params, "phases[0][items][0][quantity]", item.quantity.unwrap_or(1).to_string());
    push(&mut params, "phases[0][start_date]", start_date.to_string());
    push(&mut params, "phases[0][iterations]", cycles.to_string());
    Ok(params)
}

#[async_trait]
impl CheckoutProviderPort for StripeCheckoutAdapter {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> AppResult<CheckoutSession> {
        let session = self
            .client
            .create_checkout_session(&checkout_session_params(request))
            .await?;
        let url = session.url.ok_or_else(|| {
            AppError::UpstreamUnavailable(format!("checkout session {} has no url", session.id))
        })?;
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    async fn limit_subscription_cycles(&self, subscription: &SubscriptionId, cycles: u32) -> AppResult<()> {
        let sub = self.client.get_subscription(subscription.as_str()).await?;

        let schedule = match &sub.schedule {
            Some(schedule_id) => {
                debug!(schedule_id = %schedule_id, "Subscription already has a schedule");
                self.client.get_subscription_schedule(schedule_id).await?
            }
            None => {
                self.client
                    .create_schedule_from_subscription(subscription.as_str())
                    .await?
            }
        };

        let params = cycle_limit_params(&sub, &schedule, cycles)?;
        let updated = self
            .client
            .update_subscription_schedule(&schedule.id, &params)
            .await?;
        info!(schedule_id = %updated.id, cycles, "Subscription schedule limited");
        Ok(())
    }

    async fn get_subscription_metadata(&self, subscription: &SubscriptionId) -> AppResult<MetadataMap> {
        let sub = self.client.get_subscription(subscription.as_str()).await?;
        Ok(sub.metadata)
    }
}
