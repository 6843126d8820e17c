//! Common types used across GymTrack

use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Member account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Inactive,
    Suspended,
}

impl Default for MemberStatus {
    fn default() -> Self {
        Self::Active
    }
}

/// Subscription lifecycle status
///
/// Transitions are one-directional except active ⇄ frozen. Renewal never
/// re-activates a record: it expires the old subscription and inserts a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Frozen,
    Cancelled,
}

impl SubscriptionStatus {
    /// Only active subscriptions may be frozen
    pub fn can_freeze(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Only frozen subscriptions may be unfrozen
    pub fn can_unfreeze(&self) -> bool {
        matches!(self, Self::Frozen)
    }

    /// Terminal states reject every lifecycle operation
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Cancelled)
    }

    /// Lowercase name as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Frozen => "frozen",
            Self::Cancelled => "cancelled",
        }
    }
}

/// How a payment was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    BankTransfer,
}

impl PaymentMethod {
    /// Card payments settle asynchronously through the gateway;
    /// everything else completes at the counter.
    pub fn settles_via_gateway(&self) -> bool {
        matches!(self, Self::Card)
    }
}

/// Payment settlement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

/// Invoice document status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

/// Coupon discount type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percentage,
    Fixed,
}

/// Ledger entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
    Refund,
}

// =============================================================================
// Document Numbering
// =============================================================================

/// Member numbers are sequential with an `M` prefix, starting at M1001.
pub fn next_member_number(last: Option<&str>) -> String {
    next_numbered(last, "M", 1001)
}

/// Invoice numbers are sequential with an `INV-` prefix, starting at INV-1001.
pub fn next_invoice_number(last: Option<&str>) -> String {
    next_numbered(last, "INV-", 1001)
}

fn next_numbered(last: Option<&str>, prefix: &str, first: u64) -> String {
    let next = last
        .and_then(|n| n.strip_prefix(prefix))
        .and_then(|n| n.parse::<u64>().ok())
        .map(|n| n + 1)
        .unwrap_or(first);
    format!("{}{}", prefix, next)
}

// =============================================================================
// Pagination
// =============================================================================

/// Pagination metadata attached to list responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(total: i64, page: i64, limit: i64) -> Self {
        let total_pages = if limit > 0 {
            (total + limit - 1) / limit
        } else {
            0
        };
        Self {
            total,
            page,
            limit,
            total_pages,
        }
    }

    /// Rows to skip for this page
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_status_transitions() {
        assert!(SubscriptionStatus::Active.can_freeze());
        assert!(!SubscriptionStatus::Frozen.can_freeze());
        assert!(!SubscriptionStatus::Expired.can_freeze());
        assert!(!SubscriptionStatus::Cancelled.can_freeze());

        assert!(SubscriptionStatus::Frozen.can_unfreeze());
        assert!(!SubscriptionStatus::Active.can_unfreeze());

        assert!(SubscriptionStatus::Expired.is_terminal());
        assert!(SubscriptionStatus::Cancelled.is_terminal());
        assert!(!SubscriptionStatus::Active.is_terminal());
        assert!(!SubscriptionStatus::Frozen.is_terminal());
    }

    #[test]
    fn test_payment_method_gateway() {
        assert!(PaymentMethod::Card.settles_via_gateway());
        assert!(!PaymentMethod::Cash.settles_via_gateway());
        assert!(!PaymentMethod::BankTransfer.settles_via_gateway());
    }

    #[test]
    fn test_member_number_sequence() {
        assert_eq!(next_member_number(None), "M1001");
        assert_eq!(next_member_number(Some("M1001")), "M1002");
        assert_eq!(next_member_number(Some("M2499")), "M2500");
        // Malformed last number falls back to the start of the sequence
        assert_eq!(next_member_number(Some("garbage")), "M1001");
    }

    #[test]
    fn test_invoice_number_sequence() {
        assert_eq!(next_invoice_number(None), "INV-1001");
        assert_eq!(next_invoice_number(Some("INV-1041")), "INV-1042");
    }

    #[test]
    fn test_pagination_math() {
        let p = Pagination::new(45, 2, 10);
        assert_eq!(p.total_pages, 5);
        assert_eq!(p.offset(), 10);

        let exact = Pagination::new(40, 1, 10);
        assert_eq!(exact.total_pages, 4);
        assert_eq!(exact.offset(), 0);

        let empty = Pagination::new(0, 1, 10);
        assert_eq!(empty.total_pages, 0);
    }
}
