use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub role: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub price: i64,
    pub stock: i32,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    pub kind: String,
    pub value: i64,
    pub min_amount: i64,
    pub max_discount: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub usage_limit: Option<i32>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subtotal: i64,
    pub discount: i64,
    pub total: i64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub seller_id: Uuid,
    pub product_title: String,
    pub quantity: i32,
    pub price_at_order: i64,
    pub created_at: DateTime<Utc>,
}

/// Order lifecycle. Forward-only: pending -> paid -> shipped -> delivered,
/// with pending -> cancelled as the single permitted reversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Paid,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "paid" => Some(OrderStatus::Paid),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    fn rank(self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Paid => 1,
            OrderStatus::Shipped => 2,
            OrderStatus::Delivered => 3,
            // Terminal; guarded before rank is ever compared.
            OrderStatus::Cancelled => u8::MAX,
        }
    }

    /// Validate a status-update transition. Cancellation goes through the
    /// dedicated cancel operation, never through here.
    pub fn validate_advance(self, next: OrderStatus) -> Result<(), AppError> {
        match self {
            OrderStatus::Cancelled => Err(AppError::InvalidTransition(
                "Cannot update cancelled order".into(),
            )),
            OrderStatus::Delivered => Err(AppError::InvalidTransition(
                "Cannot update delivered order".into(),
            )),
            _ => {
                if next == OrderStatus::Cancelled {
                    return Err(AppError::InvalidTransition(
                        "Orders are cancelled through the cancel operation".into(),
                    ));
                }
                if next.rank() <= self.rank() {
                    return Err(AppError::InvalidTransition(format!(
                        "Cannot move order from {} to {}",
                        self.as_str(),
                        next.as_str()
                    )));
                }
                Ok(())
            }
        }
    }

    /// Validate that an order may enter the cancellation path.
    pub fn validate_cancel(self) -> Result<(), AppError> {
        match self {
            OrderStatus::Cancelled => Err(AppError::AlreadyCancelled),
            OrderStatus::Pending => Ok(()),
            _ => Err(AppError::OnlyPendingCancellable),
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
