use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::coupons::{CouponList, CreateCouponRequest, UpdateCouponRequest},
    entity::{
        coupons::{ActiveModel, Column, Entity as Coupons, Model as CouponModel},
        order_coupons::{Column as OrderCouponCol, Entity as OrderCoupons},
        user_coupons::{Column as UserCouponCol, Entity as UserCoupons},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_seller_or_admin},
    models::Coupon,
    response::{ApiResponse, Meta},
    routes::params::CouponQuery,
    state::AppState,
};

pub async fn create_coupon(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    ensure_seller_or_admin(user)?;

    if payload.kind != "percentage" && payload.kind != "fixed" {
        return Err(AppError::BadRequest(
            "Invalid coupon type. Must be 'percentage' or 'fixed'".into(),
        ));
    }
    if payload.kind == "percentage" && !(1..=99).contains(&payload.value) {
        return Err(AppError::BadRequest(
            "For percentage type, the value must be between 1 and 99".into(),
        ));
    }
    if payload.kind == "fixed" && payload.value <= 0 {
        return Err(AppError::BadRequest("value must be greater than 0".into()));
    }

    let code = payload.code.trim().to_uppercase();
    if code.is_empty() {
        return Err(AppError::BadRequest("code is required".into()));
    }

    let existing = Coupons::find()
        .filter(Column::Code.eq(code.clone()))
        .one(&state.orm)
        .await?;
    if existing.is_some() {
        return Err(AppError::BadRequest(
            "A coupon with this code already exists".into(),
        ));
    }

    let coupon = ActiveModel {
        id: Set(Uuid::new_v4()),
        code: Set(code),
        kind: Set(payload.kind),
        value: Set(payload.value),
        min_amount: Set(payload.min_amount.unwrap_or(0)),
        max_discount: Set(payload.max_discount),
        expires_at: Set(payload.expires_at.map(Into::into)),
        is_active: Set(payload.is_active.unwrap_or(true)),
        usage_limit: Set(payload.usage_limit),
        created_by: Set(user.user_id),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "coupon_create",
        Some("coupons"),
        Some(serde_json::json!({ "coupon_id": coupon.id, "code": coupon.code })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Coupon created successfully",
        coupon_from_entity(coupon),
        Some(Meta::empty()),
    ))
}

pub async fn list_coupons(
    state: &AppState,
    user: &AuthUser,
    query: CouponQuery,
) -> AppResult<ApiResponse<CouponList>> {
    ensure_seller_or_admin(user)?;
    let (page, limit, offset) = query.pagination.normalize();

    let mut condition = Condition::all();
    // Sellers only see their own coupons; admins see everything.
    if !user.is_admin() {
        condition = condition.add(Column::CreatedBy.eq(user.user_id));
    }
    if let Some(kind) = query.kind.as_ref().filter(|k| !k.is_empty()) {
        condition = condition.add(Column::Kind.eq(kind.clone()));
    }
    if let Some(is_active) = query.is_active {
        condition = condition.add(Column::IsActive.eq(is_active));
    }

    let finder = Coupons::find()
        .filter(condition)
        .order_by_desc(Column::CreatedAt);

    let total = finder.clone().count(&state.orm).await? as i64;

    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(coupon_from_entity)
        .collect();

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Coupons retrieved successfully",
        CouponList { items },
        Some(meta),
    ))
}

pub async fn get_coupon(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Coupon>> {
    ensure_seller_or_admin(user)?;
    let coupon = find_owned(state, user, id).await?;
    Ok(ApiResponse::success(
        "Coupon retrieved successfully",
        coupon_from_entity(coupon),
        Some(Meta::empty()),
    ))
}

pub async fn update_coupon(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCouponRequest,
) -> AppResult<ApiResponse<Coupon>> {
    ensure_seller_or_admin(user)?;
    let existing = find_owned(state, user, id).await?;

    let mut active: ActiveModel = existing.into();
    if let Some(value) = payload.value {
        if value <= 0 {
            return Err(AppError::BadRequest("value must be greater than 0".into()));
        }
        active.value = Set(value);
    }
    if let Some(min_amount) = payload.min_amount {
        active.min_amount = Set(min_amount);
    }
    if let Some(max_discount) = payload.max_discount {
        active.max_discount = Set(Some(max_discount));
    }
    if let Some(expires_at) = payload.expires_at {
        active.expires_at = Set(Some(expires_at.into()));
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    if let Some(usage_limit) = payload.usage_limit {
        active.usage_limit = Set(Some(usage_limit));
    }

    let coupon = active.update(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "coupon_update",
        Some("coupons"),
        Some(serde_json::json!({ "coupon_id": coupon.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Coupon updated successfully",
        coupon_from_entity(coupon),
        Some(Meta::empty()),
    ))
}

pub async fn delete_coupon(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_seller_or_admin(user)?;
    let existing = find_owned(state, user, id).await?;

    // Redeemed coupons are referenced by user_coupons/order_coupons rows and
    // must stay; deactivate instead of deleting.
    let redeemed = UserCoupons::find()
        .filter(UserCouponCol::CouponId.eq(existing.id))
        .count(&state.orm)
        .await?;
    let applied = OrderCoupons::find()
        .filter(OrderCouponCol::CouponId.eq(existing.id))
        .count(&state.orm)
        .await?;
    if redeemed > 0 || applied > 0 {
        return Err(AppError::BadRequest(
            "Coupon has been redeemed and cannot be deleted; deactivate it instead".into(),
        ));
    }

    Coupons::delete_by_id(existing.id).exec(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "coupon_delete",
        Some("coupons"),
        Some(serde_json::json!({ "coupon_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Coupon deleted successfully",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

async fn find_owned(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<CouponModel> {
    let mut condition = Condition::all().add(Column::Id.eq(id));
    if !user.is_admin() {
        condition = condition.add(Column::CreatedBy.eq(user.user_id));
    }
    Coupons::find()
        .filter(condition)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

pub fn coupon_from_entity(model: CouponModel) -> Coupon {
    Coupon {
        id: model.id,
        code: model.code,
        kind: model.kind,
        value: model.value,
        min_amount: model.min_amount,
        max_discount: model.max_discount,
        expires_at: model.expires_at.map(|dt| dt.with_timezone(&Utc)),
        is_active: model.is_active,
        usage_limit: model.usage_limit,
        created_by: model.created_by,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
