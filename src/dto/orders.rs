use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Order, OrderItem};

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    /// Coupon codes in the order they should be applied. Order matters: a
    /// later coupon's minimum is checked against the already-discounted
    /// subtotal.
    #[serde(default)]
    pub coupon_codes: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AppliedCouponDto {
    pub coupon_id: Uuid,
    pub code: String,
    pub kind: String,
    pub value: i64,
    pub discount_amount: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub coupons: Vec<AppliedCouponDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithCoupons {
    #[serde(flatten)]
    pub order: Order,
    pub coupons: Vec<AppliedCouponDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<OrderWithCoupons>,
}
