use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::Coupon;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCouponRequest {
    pub code: String,
    pub kind: String,
    pub value: i64,
    pub min_amount: Option<i64>,
    pub max_discount: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
    pub usage_limit: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCouponRequest {
    pub value: Option<i64>,
    pub min_amount: Option<i64>,
    pub max_discount: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
    pub usage_limit: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct CouponList {
    #[schema(value_type = Vec<Coupon>)]
    pub items: Vec<Coupon>,
}
