//! GymTrack Shared Types and Utilities
//!
//! This crate contains types and utilities shared across the GymTrack platform.

pub mod coupon;
pub mod db;
pub mod types;

pub use coupon::{CouponQuote, CouponRejection, CouponRules};
pub use db::*;
pub use types::*;
