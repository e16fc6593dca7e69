use chrono::{Duration, Utc};
use uuid::Uuid;

use marketplace_order_api::entity::coupons;
use marketplace_order_api::error::AppError;
use marketplace_order_api::services::discount::{check_redeemable, compute_discount};

fn coupon(kind: &str, value: i64, min_amount: i64, max_discount: Option<i64>) -> coupons::Model {
    coupons::Model {
        id: Uuid::new_v4(),
        code: "TEST".into(),
        kind: kind.into(),
        value,
        min_amount,
        max_discount,
        expires_at: None,
        is_active: true,
        usage_limit: None,
        created_by: Uuid::new_v4(),
        created_at: Utc::now().into(),
    }
}

#[test]
fn percentage_discount_takes_share_of_running_subtotal() {
    let c = coupon("percentage", 20, 0, None);
    assert_eq!(compute_discount(&c, 20000).unwrap(), 4000);
}

#[test]
fn percentage_discount_is_capped_at_max_discount() {
    let c = coupon("percentage", 20, 0, Some(1000));
    assert_eq!(compute_discount(&c, 20000).unwrap(), 1000);
}

#[test]
fn fixed_discount_never_exceeds_running_subtotal() {
    let c = coupon("fixed", 5000, 0, None);
    assert_eq!(compute_discount(&c, 3000).unwrap(), 3000);
    assert_eq!(compute_discount(&c, 8000).unwrap(), 5000);
}

#[test]
fn minimum_amount_is_a_strict_lower_bound() {
    let c = coupon("fixed", 500, 10000, None);
    match compute_discount(&c, 9900) {
        Err(AppError::MinimumAmountNotMet { min_amount, .. }) => assert_eq!(min_amount, 10000),
        other => panic!("expected MinimumAmountNotMet, got {other:?}"),
    }
    assert_eq!(compute_discount(&c, 10000).unwrap(), 500);
}

#[test]
fn inactive_coupon_is_invalid() {
    let mut c = coupon("fixed", 500, 0, None);
    c.is_active = false;
    assert!(matches!(
        check_redeemable(&c, Utc::now()),
        Err(AppError::InvalidCoupon(_))
    ));
}

#[test]
fn expired_coupon_is_rejected() {
    let now = Utc::now();
    let mut c = coupon("fixed", 500, 0, None);
    c.expires_at = Some((now - Duration::hours(1)).into());
    assert!(matches!(
        check_redeemable(&c, now),
        Err(AppError::CouponExpired(_))
    ));

    c.expires_at = Some((now + Duration::hours(1)).into());
    assert!(check_redeemable(&c, now).is_ok());

    c.expires_at = None;
    assert!(check_redeemable(&c, now).is_ok());
}

// The stack is a left-to-right fold threading the running subtotal, so the
// submission order changes whether a later minimum is still met.
#[test]
fn coupon_order_is_significant() {
    let fixed = coupon("fixed", 5000, 0, None);
    let mut pct = coupon("percentage", 10, 10000, None);
    pct.code = "PCT10".into();

    let subtotal = 10000_i64;

    // [pct, fixed]: the percentage sees the full subtotal and passes its
    // minimum, then the fixed coupon eats most of the rest.
    let mut running = subtotal;
    let a = compute_discount(&pct, running).unwrap();
    running -= a;
    let b = compute_discount(&fixed, running).unwrap();
    running -= b;
    assert_eq!(a, 1000);
    assert_eq!(b, 5000);
    assert_eq!(running, 4000);

    // [fixed, pct]: the fixed coupon drops the running subtotal below the
    // percentage coupon's minimum.
    let mut running = subtotal;
    let first = compute_discount(&fixed, running).unwrap();
    running -= first;
    assert!(matches!(
        compute_discount(&pct, running),
        Err(AppError::MinimumAmountNotMet { .. })
    ));
}

#[test]
fn full_stack_never_discounts_below_zero() {
    let big = coupon("fixed", 100_000, 0, None);
    let mut running = 7500_i64;
    let amount = compute_discount(&big, running).unwrap();
    running -= amount;
    assert_eq!(running, 0);

    // A follow-up coupon with no minimum still cannot push the total negative.
    let more = coupon("fixed", 100, 0, None);
    let amount = compute_discount(&more, running).unwrap();
    assert_eq!(amount, 0);
}
