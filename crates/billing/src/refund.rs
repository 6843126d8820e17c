//! Refunds through the Stripe API

use stripe::{CreateRefund, PaymentIntentId, Refund, RefundReasonFilter};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Service for refunding card charges
#[derive(Clone)]
pub struct RefundService {
    stripe: StripeClient,
}

impl RefundService {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    /// Refund the full charge behind a PaymentIntent.
    ///
    /// Gateway failures surface to the caller unchanged; there is no retry.
    pub async fn refund_payment_intent(&self, payment_intent_id: &str) -> BillingResult<String> {
        let intent_id = payment_intent_id
            .parse::<PaymentIntentId>()
            .map_err(|e| BillingError::RefundFailed(format!("invalid PaymentIntent id: {}", e)))?;

        let mut params = CreateRefund::new();
        params.payment_intent = Some(intent_id);
        params.reason = Some(RefundReasonFilter::RequestedByCustomer);

        let refund = Refund::create(self.stripe.inner(), params)
            .await
            .map_err(|e| BillingError::RefundFailed(e.to_string()))?;

        tracing::info!(
            payment_intent_id = %payment_intent_id,
            refund_id = %refund.id,
            "Stripe refund created"
        );

        Ok(refund.id.to_string())
    }
}
