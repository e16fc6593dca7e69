//! Discount stacking. Coupons are applied as a strict left-to-right fold in
//! the order the caller submitted them, threading the running subtotal: a
//! later coupon's minimum-amount gate sees the already-discounted amount, so
//! [A, B] and [B, A] can legitimately produce different totals.

use chrono::{DateTime, Utc};

use crate::{entity::coupons, error::AppError};

/// Reject inactive or expired coupons. Redemption-ledger checks (already
/// used, global usage cap) need the transaction and live in the order
/// coordinator.
pub fn check_redeemable(coupon: &coupons::Model, now: DateTime<Utc>) -> Result<(), AppError> {
    if !coupon.is_active {
        return Err(AppError::InvalidCoupon(coupon.code.clone()));
    }
    if let Some(expires_at) = coupon.expires_at {
        if expires_at.with_timezone(&Utc) < now {
            return Err(AppError::CouponExpired(coupon.code.clone()));
        }
    }
    Ok(())
}

/// Discount contributed by one coupon at the current running subtotal.
///
/// Percentage coupons take `value` percent of the running subtotal, capped at
/// `max_discount` when set. Fixed coupons take `value`, clamped to the
/// running subtotal so the stack can never discount below zero.
pub fn compute_discount(coupon: &coupons::Model, running_subtotal: i64) -> Result<i64, AppError> {
    if running_subtotal < coupon.min_amount {
        return Err(AppError::MinimumAmountNotMet {
            code: coupon.code.clone(),
            min_amount: coupon.min_amount,
        });
    }

    let amount = match coupon.kind.as_str() {
        "percentage" => {
            let mut discount = running_subtotal * coupon.value / 100;
            if let Some(cap) = coupon.max_discount {
                discount = discount.min(cap);
            }
            discount
        }
        _ => coupon.value.min(running_subtotal),
    };

    Ok(amount)
}
