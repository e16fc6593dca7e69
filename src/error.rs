use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::response::{ApiResponse, Meta};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("Cart not found")]
    CartNotFound,

    #[error("Cart is empty")]
    CartEmpty,

    #[error("Product no longer available: {0}")]
    ProductUnavailable(String),

    #[error("Insufficient stock for {0}")]
    InsufficientStock(String),

    #[error("Invalid coupon: {0}")]
    InvalidCoupon(String),

    #[error("Coupon expired: {0}")]
    CouponExpired(String),

    #[error("Coupon already used: {0}")]
    CouponAlreadyUsed(String),

    #[error("Coupon usage limit reached: {0}")]
    UsageLimitReached(String),

    #[error("Minimum amount {min_amount} required for coupon: {code}")]
    MinimumAmountNotMet { code: String, min_amount: i64 },

    #[error("{0}")]
    InvalidTransition(String),

    #[error("Order already cancelled")]
    AlreadyCancelled,

    #[error("Only pending orders can be cancelled")]
    OnlyPendingCancellable,

    #[error("Bad Request {0}")]
    BadRequest(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound | AppError::CartNotFound => StatusCode::NOT_FOUND,
            AppError::CartEmpty
            | AppError::ProductUnavailable(_)
            | AppError::InsufficientStock(_)
            | AppError::InvalidCoupon(_)
            | AppError::CouponExpired(_)
            | AppError::CouponAlreadyUsed(_)
            | AppError::UsageLimitReached(_)
            | AppError::MinimumAmountNotMet { .. }
            | AppError::InvalidTransition(_)
            | AppError::AlreadyCancelled
            | AppError::OnlyPendingCancellable
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.to_string();

        let body = ApiResponse {
            message,
            data: Some(ErrorData {
                error: self.to_string(),
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
