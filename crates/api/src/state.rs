//! Shared application state

use sqlx::PgPool;

use gymtrack_billing::{ChargeService, RefundService, StripeClient, WebhookService};

use crate::auth::JwtManager;
use crate::config::Config;

/// Gateway services, present only when card payments are enabled
#[derive(Clone)]
pub struct BillingState {
    pub charges: ChargeService,
    pub refunds: RefundService,
    pub webhooks: WebhookService,
}

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub jwt: JwtManager,
    pub billing: Option<BillingState>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let jwt = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);

        let billing = if config.enable_card_payments && !config.stripe_secret_key.is_empty() {
            let stripe = StripeClient::new(gymtrack_billing::StripeConfig {
                secret_key: config.stripe_secret_key.clone(),
                webhook_secret: config.stripe_webhook_secret.clone(),
                currency: std::env::var("STRIPE_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            });
            Some(BillingState {
                charges: ChargeService::new(stripe.clone()),
                refunds: RefundService::new(stripe),
                webhooks: WebhookService::new(pool.clone(), config.stripe_webhook_secret.clone()),
            })
        } else {
            tracing::warn!("Card payments disabled: no Stripe configuration");
            None
        };

        Self {
            pool,
            config,
            jwt,
            billing,
        }
    }
}
