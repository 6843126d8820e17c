//! Stripe webhook verification and event handling
//!
//! Signatures are verified manually with HMAC-SHA256 (the `stripe-signature`
//! header carries `t=<unix>,v1=<hex>` over `{t}.{payload}`) to stay
//! independent of async-stripe's pinned API version. Verified events settle
//! payment ledger rows: success completes the payment, closes any linked
//! invoice, and writes the income transaction; failure and refund events move
//! the payment to the matching status.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use stripe::{Event, EventObject, EventType};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook timestamp before it is rejected as a replay
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Row settled by a successful payment event
#[derive(Debug, sqlx::FromRow)]
struct SettledPayment {
    id: Uuid,
    member_id: Uuid,
    invoice_id: Option<Uuid>,
    amount_cents: i64,
    receipt_number: String,
}

/// Webhook verification and dispatch service
#[derive(Clone)]
pub struct WebhookService {
    pool: PgPool,
    webhook_secret: String,
}

impl WebhookService {
    pub fn new(pool: PgPool, webhook_secret: String) -> Self {
        Self {
            pool,
            webhook_secret,
        }
    }

    /// Verify the `stripe-signature` header and parse the event payload.
    pub fn verify_event(&self, payload: &str, signature_header: &str) -> BillingResult<Event> {
        verify_signature(
            payload,
            signature_header,
            &self.webhook_secret,
            OffsetDateTime::now_utc().unix_timestamp(),
        )?;

        serde_json::from_str(payload)
            .map_err(|e| BillingError::WebhookPayloadInvalid(e.to_string()))
    }

    /// Dispatch a verified event into the payment ledger.
    ///
    /// Unknown event types are logged and acknowledged so the gateway stops
    /// redelivering them.
    pub async fn handle_event(&self, event: Event) -> BillingResult<()> {
        match event.type_ {
            EventType::PaymentIntentSucceeded => {
                if let EventObject::PaymentIntent(intent) = event.data.object {
                    let response = serde_json::json!({
                        "status": intent.status.to_string(),
                        "amount": intent.amount,
                        "currency": intent.currency.to_string(),
                    });
                    self.complete_payment(intent.id.as_str(), response).await?;
                }
            }
            EventType::PaymentIntentPaymentFailed => {
                if let EventObject::PaymentIntent(intent) = event.data.object {
                    let response = serde_json::json!({
                        "status": intent.status.to_string(),
                        "last_payment_error": intent
                            .last_payment_error
                            .as_ref()
                            .and_then(|e| e.message.clone()),
                    });
                    self.fail_payment(intent.id.as_str(), response).await?;
                }
            }
            EventType::ChargeRefunded => {
                if let EventObject::Charge(charge) = event.data.object {
                    if let Some(intent) = charge.payment_intent.as_ref() {
                        self.refund_payment(intent.id().as_str()).await?;
                    }
                }
            }
            other => {
                tracing::debug!(event_type = %other, event_id = %event.id, "Unhandled webhook event type");
            }
        }
        Ok(())
    }

    /// Mark a pending card payment completed, write its income transaction,
    /// and close the linked invoice when it is fully paid.
    async fn complete_payment(
        &self,
        payment_intent_id: &str,
        gateway_response: serde_json::Value,
    ) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;

        let settled: Option<SettledPayment> = sqlx::query_as(
            r#"
            UPDATE payments
            SET status = 'completed', paid_at = NOW(), gateway_response = $2, updated_at = NOW()
            WHERE stripe_payment_intent_id = $1 AND status = 'pending'
            RETURNING id, member_id, invoice_id, amount_cents, receipt_number
            "#,
        )
        .bind(payment_intent_id)
        .bind(&gateway_response)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(payment) = settled else {
            // Already settled or unknown intent; acknowledge without changes
            tracing::warn!(
                payment_intent_id = %payment_intent_id,
                "payment_intent.succeeded for no pending payment"
            );
            return Ok(());
        };

        sqlx::query(
            r#"
            INSERT INTO transactions (id, type, amount_cents, member_id, description, reference)
            VALUES ($1, 'income', $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(payment.amount_cents)
        .bind(payment.member_id)
        .bind(format!("Payment - {}", payment.receipt_number))
        .bind(&payment.receipt_number)
        .execute(&mut *tx)
        .await?;

        if let Some(invoice_id) = payment.invoice_id {
            close_invoice_if_settled(&mut tx, invoice_id).await?;
        }

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            payment_intent_id = %payment_intent_id,
            amount_cents = payment.amount_cents,
            "Card payment completed via webhook"
        );

        Ok(())
    }

    /// Mark a pending card payment failed.
    async fn fail_payment(
        &self,
        payment_intent_id: &str,
        gateway_response: serde_json::Value,
    ) -> BillingResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'failed', gateway_response = $2, updated_at = NOW()
            WHERE stripe_payment_intent_id = $1 AND status = 'pending'
            "#,
        )
        .bind(payment_intent_id)
        .bind(&gateway_response)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            tracing::warn!(
                payment_intent_id = %payment_intent_id,
                "payment_intent.payment_failed for no pending payment"
            );
        }

        Ok(())
    }

    /// Mark a payment refunded and write the refund transaction.
    /// Handles refunds initiated from the Stripe dashboard as well as
    /// API-initiated ones (which are already refunded locally, making this a no-op).
    async fn refund_payment(&self, payment_intent_id: &str) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;

        let refunded: Option<SettledPayment> = sqlx::query_as(
            r#"
            UPDATE payments
            SET status = 'refunded', updated_at = NOW()
            WHERE stripe_payment_intent_id = $1 AND status = 'completed'
            RETURNING id, member_id, invoice_id, amount_cents, receipt_number
            "#,
        )
        .bind(payment_intent_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(payment) = refunded {
            sqlx::query(
                r#"
                INSERT INTO transactions (id, type, amount_cents, member_id, description, reference)
                VALUES ($1, 'refund', $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(payment.amount_cents)
            .bind(payment.member_id)
            .bind(format!("Refund for payment {}", payment.receipt_number))
            .bind(&payment.receipt_number)
            .execute(&mut *tx)
            .await?;

            tracing::info!(
                payment_id = %payment.id,
                payment_intent_id = %payment_intent_id,
                "Payment refunded via webhook"
            );
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Close an invoice once the sum of completed payments covers its total.
/// Callable from both the webhook path and the synchronous payment path.
pub async fn close_invoice_if_settled(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    invoice_id: Uuid,
) -> BillingResult<()> {
    let row: Option<(i64, i64)> = sqlx::query_as(
        r#"
        SELECT i.total_cents,
               COALESCE(SUM(p.amount_cents) FILTER (WHERE p.status = 'completed'), 0)::BIGINT
        FROM invoices i
        LEFT JOIN payments p ON p.invoice_id = i.id
        WHERE i.id = $1
        GROUP BY i.id
        "#,
    )
    .bind(invoice_id)
    .fetch_optional(&mut **tx)
    .await?;

    if let Some((total_cents, paid_cents)) = row {
        if paid_cents >= total_cents {
            sqlx::query(
                r#"
                UPDATE invoices
                SET status = 'paid', paid_at = NOW(), updated_at = NOW()
                WHERE id = $1 AND status NOT IN ('paid', 'cancelled')
                "#,
            )
            .bind(invoice_id)
            .execute(&mut **tx)
            .await?;
        }
    }

    Ok(())
}

/// Verify an HMAC-SHA256 webhook signature at a given point in time.
///
/// Header format: `t=<unix_timestamp>,v1=<hex_signature>[,v1=...]`.
/// The signed message is `{timestamp}.{payload}`.
fn verify_signature(
    payload: &str,
    header: &str,
    secret: &str,
    now_unix: i64,
) -> BillingResult<()> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(BillingError::WebhookSignatureInvalid)?;
    if candidates.is_empty() {
        return Err(BillingError::WebhookSignatureInvalid);
    }

    if (now_unix - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(BillingError::WebhookSignatureInvalid);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BillingError::Internal(e.to_string()))?;
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    for candidate in candidates {
        // Hex decode normalizes case before comparing
        if let Ok(bytes) = hex::decode(candidate) {
            if let (Ok(expected_bytes), true) = (hex::decode(&expected), !bytes.is_empty()) {
                if bytes == expected_bytes {
                    return Ok(());
                }
            }
        }
    }

    Err(BillingError::WebhookSignatureInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";
    const PAYLOAD: &str = r#"{"id":"evt_123","type":"payment_intent.succeeded"}"#;

    fn sign(payload: &str, secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        format!(
            "t={},v1={}",
            timestamp,
            hex::encode(mac.finalize().into_bytes())
        )
    }

    #[test]
    fn test_valid_signature_accepted() {
        let now = 1_700_000_000;
        let header = sign(PAYLOAD, SECRET, now);
        assert!(verify_signature(PAYLOAD, &header, SECRET, now).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let now = 1_700_000_000;
        let header = sign(PAYLOAD, "whsec_other", now);
        assert!(matches!(
            verify_signature(PAYLOAD, &header, SECRET, now),
            Err(BillingError::WebhookSignatureInvalid)
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let now = 1_700_000_000;
        let header = sign(PAYLOAD, SECRET, now);
        let tampered = r#"{"id":"evt_123","type":"charge.refunded"}"#;
        assert!(verify_signature(tampered, &header, SECRET, now).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let now = 1_700_000_000;
        let header = sign(PAYLOAD, SECRET, now - SIGNATURE_TOLERANCE_SECS - 1);
        assert!(verify_signature(PAYLOAD, &header, SECRET, now).is_err());
    }

    #[test]
    fn test_timestamp_within_tolerance_accepted() {
        let now = 1_700_000_000;
        let header = sign(PAYLOAD, SECRET, now - SIGNATURE_TOLERANCE_SECS + 10);
        assert!(verify_signature(PAYLOAD, &header, SECRET, now).is_ok());
    }

    #[test]
    fn test_malformed_header_rejected() {
        let now = 1_700_000_000;
        assert!(verify_signature(PAYLOAD, "", SECRET, now).is_err());
        assert!(verify_signature(PAYLOAD, "t=abc,v1=zz", SECRET, now).is_err());
        assert!(verify_signature(PAYLOAD, "v1=deadbeef", SECRET, now).is_err());
        assert!(verify_signature(PAYLOAD, &format!("t={}", now), SECRET, now).is_err());
    }
}
