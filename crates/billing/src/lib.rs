//! GymTrack payment gateway integration
//!
//! Wraps the Stripe API for card charges and refunds, and verifies/dispatches
//! gateway webhook events back into the payment ledger. Cash and bank-transfer
//! payments never touch this crate.

pub mod charge;
pub mod client;
pub mod error;
pub mod refund;
pub mod webhooks;

pub use charge::{CardCharge, ChargeService};
pub use client::{StripeClient, StripeConfig};
pub use error::{BillingError, BillingResult};
pub use refund::RefundService;
pub use webhooks::WebhookService;
