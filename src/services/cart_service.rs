use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::cart::{AddToCartRequest, CartDto, CartItemDto, UpdateCartItemRequest},
    entity::{
        cart_items::{ActiveModel as CartItemActive, Column as CartItemCol, Entity as CartItems},
        carts::{self, ActiveModel as CartActive, Column as CartCol, Entity as Carts},
        products::Entity as Products,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::{ApiResponse, Meta},
    services::product_service::product_from_entity,
    state::AppState,
};

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartDto>> {
    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .one(&state.orm)
        .await?;

    let cart = match cart {
        Some(c) => c,
        None => {
            return Ok(ApiResponse::success(
                "Cart is empty",
                CartDto {
                    id: None,
                    items: Vec::new(),
                    total_amount: 0,
                },
                Some(Meta::empty()),
            ));
        }
    };

    let data = build_cart_dto(&state.orm, &cart).await?;
    Ok(ApiResponse::success(
        "Cart retrieved successfully",
        data,
        Some(Meta::empty()),
    ))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartDto>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let product = Products::find_by_id(payload.product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("product not found".to_string()))?;
    if product.deleted_at.is_some() {
        return Err(AppError::ProductUnavailable(product.title.clone()));
    }
    if product.stock < payload.quantity {
        return Err(AppError::InsufficientStock(product.title.clone()));
    }

    let cart = get_or_create_cart(state, user.user_id).await?;

    let existing = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .filter(CartItemCol::ProductId.eq(payload.product_id))
        .one(&state.orm)
        .await?;

    // Repeat add increments the line quantity rather than replacing it.
    if existing.is_some() {
        CartItems::update_many()
            .col_expr(
                CartItemCol::Quantity,
                Expr::col(CartItemCol::Quantity).add(payload.quantity),
            )
            .filter(CartItemCol::CartId.eq(cart.id))
            .filter(CartItemCol::ProductId.eq(payload.product_id))
            .exec(&state.orm)
            .await?;
    } else {
        CartItemActive {
            id: Set(Uuid::new_v4()),
            cart_id: Set(cart.id),
            product_id: Set(payload.product_id),
            quantity: Set(payload.quantity),
            created_at: NotSet,
        }
        .insert(&state.orm)
        .await?;
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_add",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": payload.product_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let data = build_cart_dto(&state.orm, &cart).await?;
    Ok(ApiResponse::success(
        "Product added to cart successfully",
        data,
        Some(Meta::empty()),
    ))
}

pub async fn update_cart_item(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: UpdateCartItemRequest,
) -> AppResult<ApiResponse<CartDto>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let cart = get_existing_cart(state, user.user_id).await?;

    let product = Products::find_by_id(product_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::BadRequest("product not found".to_string()))?;
    if product.stock < payload.quantity {
        return Err(AppError::InsufficientStock(product.title.clone()));
    }

    let result = CartItems::update_many()
        .col_expr(CartItemCol::Quantity, Expr::value(payload.quantity))
        .filter(CartItemCol::CartId.eq(cart.id))
        .filter(CartItemCol::ProductId.eq(product_id))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    let data = build_cart_dto(&state.orm, &cart).await?;
    Ok(ApiResponse::success(
        "Cart item updated successfully",
        data,
        Some(Meta::empty()),
    ))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<CartDto>> {
    let cart = get_existing_cart(state, user.user_id).await?;

    let result = CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .filter(CartItemCol::ProductId.eq(product_id))
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": product_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let data = build_cart_dto(&state.orm, &cart).await?;
    Ok(ApiResponse::success(
        "Product removed from cart successfully",
        data,
        Some(Meta::empty()),
    ))
}

pub async fn clear_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartDto>> {
    let cart = get_existing_cart(state, user.user_id).await?;

    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&state.orm)
        .await?;

    let data = build_cart_dto(&state.orm, &cart).await?;
    Ok(ApiResponse::success(
        "Cart cleared successfully",
        data,
        Some(Meta::empty()),
    ))
}

/// Carts are created lazily on first add and never deleted.
async fn get_or_create_cart(state: &AppState, user_id: Uuid) -> AppResult<carts::Model> {
    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(&state.orm)
        .await?;
    if let Some(cart) = cart {
        return Ok(cart);
    }

    let cart = CartActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(cart)
}

async fn get_existing_cart(state: &AppState, user_id: Uuid) -> AppResult<carts::Model> {
    Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::CartNotFound)
}

async fn build_cart_dto<C: ConnectionTrait>(conn: &C, cart: &carts::Model) -> AppResult<CartDto> {
    let rows = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .find_also_related(Products)
        .all(conn)
        .await?;

    let mut items = Vec::with_capacity(rows.len());
    let mut total_amount: i64 = 0;
    for (item, product) in rows {
        let product = product.ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("cart item {} has no product", item.id))
        })?;
        total_amount += product.price * item.quantity as i64;
        items.push(CartItemDto {
            id: item.id,
            product: product_from_entity(product),
            quantity: item.quantity,
        });
    }

    Ok(CartDto {
        id: Some(cart.id),
        items,
        total_amount,
    })
}
