//! Card charges through Stripe PaymentIntents
//!
//! A card payment is recorded as `pending` in the ledger, a PaymentIntent is
//! created here, and the webhook receiver settles the ledger row when the
//! gateway reports the outcome.

use std::collections::HashMap;

use serde::Serialize;
use stripe::{CreatePaymentIntent, CreatePaymentIntentAutomaticPaymentMethods, PaymentIntent};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// The gateway-side handle for a freshly created card charge
#[derive(Debug, Clone, Serialize)]
pub struct CardCharge {
    /// Stripe PaymentIntent id, stored on the payment row
    pub payment_intent_id: String,
    /// Client secret the frontend needs to confirm the payment
    pub client_secret: Option<String>,
}

/// Service for creating card charges
#[derive(Clone)]
pub struct ChargeService {
    stripe: StripeClient,
}

impl ChargeService {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    /// Create a PaymentIntent for a ledger payment.
    ///
    /// The payment and member ids travel as metadata so gateway events can be
    /// traced back to ledger rows even if the intent id is lost.
    pub async fn create_card_charge(
        &self,
        payment_id: Uuid,
        member_id: Uuid,
        amount_cents: i64,
        description: Option<&str>,
    ) -> BillingResult<CardCharge> {
        if amount_cents <= 0 {
            return Err(BillingError::InvalidAmount(format!(
                "charge amount must be positive, got {} cents",
                amount_cents
            )));
        }

        let mut metadata = HashMap::new();
        metadata.insert("payment_id".to_string(), payment_id.to_string());
        metadata.insert("member_id".to_string(), member_id.to_string());

        let mut params = CreatePaymentIntent::new(amount_cents, self.stripe.currency());
        params.description = description;
        params.metadata = Some(metadata);
        params.automatic_payment_methods = Some(CreatePaymentIntentAutomaticPaymentMethods {
            enabled: true,
            ..Default::default()
        });

        let intent = PaymentIntent::create(self.stripe.inner(), params).await?;

        tracing::info!(
            payment_id = %payment_id,
            payment_intent_id = %intent.id,
            amount_cents = amount_cents,
            "Created PaymentIntent for card payment"
        );

        Ok(CardCharge {
            payment_intent_id: intent.id.to_string(),
            client_secret: intent.client_secret,
        })
    }
}
