//! API routes

pub mod attendance;
pub mod auth;
pub mod coupons;
pub mod dashboard;
pub mod export;
pub mod health;
pub mod invoices;
pub mod members;
pub mod packages;
pub mod payments;
pub mod subscriptions;
pub mod transactions;
pub mod webhook;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{auth::require_auth, state::AppState};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Public API routes (no auth required) - under /api/v1
    let public_api_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        // Stripe webhook (public, uses signature verification)
        .route("/billing/webhook", post(webhook::stripe_webhook));

    // Protected API routes (auth required) - under /api/v1
    let protected_api_routes = Router::new()
        // Auth
        .route("/auth/me", get(auth::me))
        // Members
        .route("/members", get(members::list_members))
        .route("/members", post(members::create_member))
        .route("/members/bulk-status", post(members::bulk_update_status))
        .route("/members/export", get(export::export_members))
        .route("/members/:member_id", get(members::get_member))
        .route("/members/:member_id", patch(members::update_member))
        .route("/members/:member_id", delete(members::delete_member))
        // Attendance
        .route(
            "/members/:member_id/attendance",
            get(attendance::member_attendance),
        )
        .route(
            "/members/:member_id/attendance",
            post(attendance::record_attendance),
        )
        // Packages
        .route("/packages", get(packages::list_packages))
        .route("/packages", post(packages::create_package))
        .route("/packages/:package_id", get(packages::get_package))
        .route("/packages/:package_id", patch(packages::update_package))
        .route("/packages/:package_id", delete(packages::delete_package))
        // Subscriptions
        .route("/subscriptions", get(subscriptions::list_subscriptions))
        .route("/subscriptions", post(subscriptions::create_subscription))
        .route(
            "/subscriptions/expiring",
            get(subscriptions::expiring_subscriptions),
        )
        .route(
            "/subscriptions/:subscription_id",
            get(subscriptions::get_subscription),
        )
        .route(
            "/subscriptions/:subscription_id",
            delete(subscriptions::cancel_subscription),
        )
        .route(
            "/subscriptions/:subscription_id/freeze",
            post(subscriptions::freeze_subscription),
        )
        .route(
            "/subscriptions/:subscription_id/unfreeze",
            post(subscriptions::unfreeze_subscription),
        )
        .route(
            "/subscriptions/:subscription_id/renew",
            post(subscriptions::renew_subscription),
        )
        // Payments
        .route("/payments", get(payments::list_payments))
        .route("/payments", post(payments::create_payment))
        .route("/payments/export", get(export::export_payments))
        .route("/payments/:payment_id", get(payments::get_payment))
        .route("/payments/:payment_id/refund", post(payments::refund_payment))
        // Invoices
        .route("/invoices", get(invoices::list_invoices))
        .route("/invoices", post(invoices::create_invoice))
        .route("/invoices/:invoice_id", get(invoices::get_invoice))
        .route("/invoices/:invoice_id", delete(invoices::cancel_invoice))
        // Coupons
        .route("/coupons", get(coupons::list_coupons))
        .route("/coupons", post(coupons::create_coupon))
        .route("/coupons/:coupon_id", patch(coupons::update_coupon))
        .route("/coupons/:coupon_id", delete(coupons::delete_coupon))
        .route("/coupons/:code/validate", post(coupons::validate_coupon))
        .route("/coupons/:code/redeem", post(coupons::redeem_coupon))
        // Transactions
        .route("/transactions", get(transactions::list_transactions))
        // Dashboard
        .route("/dashboard/stats", get(dashboard::stats))
        .route("/dashboard/attendance", get(dashboard::attendance_series))
        .route("/dashboard/revenue", get(dashboard::revenue_series))
        .route(
            "/dashboard/subscriptions",
            get(dashboard::subscriptions_by_package),
        )
        .route("/dashboard/member-growth", get(dashboard::member_growth))
        // Apply auth middleware to protected routes
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // Combine API routes under /api/v1 prefix
    let api_v1_routes = Router::new()
        .merge(public_api_routes)
        .merge(protected_api_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        // Global request body size limit to prevent DoS via large payloads
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .with_state(state)
}
