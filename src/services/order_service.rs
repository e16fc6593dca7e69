use std::collections::HashSet;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::{Expr, LockType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::orders::{AppliedCouponDto, CreateOrderRequest, OrderList, OrderWithCoupons, OrderWithItems},
    entity::{
        cart_items::{Column as CartItemCol, Entity as CartItems},
        carts::{Column as CartCol, Entity as Carts},
        coupons::{self, Column as CouponCol, Entity as Coupons},
        order_coupons::{
            ActiveModel as OrderCouponActive, Column as OrderCouponCol, Entity as OrderCoupons,
        },
        order_items::{
            ActiveModel as OrderItemActive, Column as OrderItemCol, Entity as OrderItems,
            Model as OrderItemModel,
        },
        orders::{ActiveModel as OrderActive, Column as OrderCol, Entity as Orders, Model as OrderModel},
        products::{self, Column as ProdCol, Entity as Products},
        user_coupons::{ActiveModel as UserCouponActive, Column as UserCouponCol, Entity as UserCoupons},
    },
    error::{AppError, AppResult},
    events::AppEvent,
    middleware::auth::AuthUser,
    models::{Order, OrderItem, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    services::discount,
    state::AppState,
};

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all().add(OrderCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        condition = condition.add(OrderCol::Status.eq(status.clone()));
    }

    let sort_order = query.sort_order.unwrap_or(SortOrder::Desc);

    let mut finder = Orders::find().filter(condition);
    finder = match sort_order {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let models = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let mut items = Vec::with_capacity(models.len());
    for model in models {
        let coupons = load_applied_coupons(&state.orm, model.id).await?;
        items.push(OrderWithCoupons {
            order: order_from_entity(model)?,
            coupons,
        });
    }

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Orders retrieved successfully",
        OrderList { items },
        Some(meta),
    ))
}

/// Convert the caller's cart into an immutable order.
///
/// Everything here up to the commit is one transaction: order row, item
/// snapshots, coupon redemptions, stock decrements and the cart clear become
/// visible together or not at all. An early return drops the transaction,
/// which rolls it back.
pub async fn create_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let txn = state.orm.begin().await?;
    let now = Utc::now();

    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .one(&txn)
        .await?
        .ok_or(AppError::CartNotFound)?;

    // Stable product_id order gives every transaction the same lock
    // acquisition order, so two orders sharing products cannot deadlock.
    let cart_items = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .order_by_asc(CartItemCol::ProductId)
        .all(&txn)
        .await?;
    if cart_items.is_empty() {
        return Err(AppError::CartEmpty);
    }

    // Resolve each line against the product row under FOR UPDATE so the
    // availability check and the later decrement see the same snapshot.
    let mut lines: Vec<(i32, products::Model)> = Vec::with_capacity(cart_items.len());
    let mut subtotal: i64 = 0;
    for item in &cart_items {
        let product = Products::find_by_id(item.product_id)
            .lock(LockType::Update)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::ProductUnavailable(item.product_id.to_string()))?;
        if product.deleted_at.is_some() {
            return Err(AppError::ProductUnavailable(product.title.clone()));
        }
        if product.stock < item.quantity {
            return Err(AppError::InsufficientStock(product.title.clone()));
        }
        subtotal += product.price * item.quantity as i64;
        lines.push((item.quantity, product));
    }

    // Left-to-right coupon fold over the submitted codes.
    let mut discount_total: i64 = 0;
    let mut running = subtotal;
    let mut applied: Vec<(coupons::Model, i64)> = Vec::new();
    let mut pending: HashSet<Uuid> = HashSet::new();
    for code in &payload.coupon_codes {
        let coupon = Coupons::find()
            .filter(CouponCol::Code.eq(code.clone()))
            .filter(CouponCol::IsActive.eq(true))
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::InvalidCoupon(code.clone()))?;
        discount::check_redeemable(&coupon, now)?;

        // Same code twice in one request counts as a reuse.
        if !pending.insert(coupon.id) {
            return Err(AppError::CouponAlreadyUsed(code.clone()));
        }

        let used = UserCoupons::find()
            .filter(UserCouponCol::UserId.eq(user.user_id))
            .filter(UserCouponCol::CouponId.eq(coupon.id))
            .one(&txn)
            .await?;
        if used.is_some() {
            return Err(AppError::CouponAlreadyUsed(code.clone()));
        }

        // Count-then-insert: concurrent redemptions can slip past the global
        // cap. Only the per-user uniqueness is constraint-backed; the cap is
        // best-effort.
        if let Some(limit) = coupon.usage_limit {
            let count = UserCoupons::find()
                .filter(UserCouponCol::CouponId.eq(coupon.id))
                .count(&txn)
                .await?;
            if count >= limit as u64 {
                return Err(AppError::UsageLimitReached(code.clone()));
            }
        }

        let amount = discount::compute_discount(&coupon, running)?;
        discount_total += amount;
        running -= amount;
        applied.push((coupon, amount));
    }

    let total = subtotal - discount_total;

    let order = OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        subtotal: Set(subtotal),
        discount: Set(discount_total),
        total: Set(total),
        status: Set(OrderStatus::Pending.as_str().into()),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&txn)
    .await?;

    let mut coupon_dtos = Vec::with_capacity(applied.len());
    for (coupon, amount) in &applied {
        OrderCouponActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            coupon_id: Set(coupon.id),
            discount_amount: Set(*amount),
            applied_at: NotSet,
        }
        .insert(&txn)
        .await?;

        UserCouponActive {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.user_id),
            coupon_id: Set(coupon.id),
            used_at: NotSet,
        }
        .insert(&txn)
        .await?;

        coupon_dtos.push(AppliedCouponDto {
            coupon_id: coupon.id,
            code: coupon.code.clone(),
            kind: coupon.kind.clone(),
            value: coupon.value,
            discount_amount: *amount,
        });
    }

    let mut order_items: Vec<OrderItem> = Vec::with_capacity(lines.len());
    for (quantity, product) in &lines {
        let item = OrderItemActive {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            product_id: Set(product.id),
            seller_id: Set(product.seller_id),
            product_title: Set(product.title.clone()),
            quantity: Set(*quantity),
            price_at_order: Set(product.price),
            created_at: NotSet,
        }
        .insert(&txn)
        .await?;
        order_items.push(order_item_from_entity(item));

        // Conditional decrement: the stock >= quantity guard re-checks under
        // the row lock, so concurrent orders cannot both pass the earlier
        // availability check and oversell.
        let result = Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).sub(*quantity))
            .filter(ProdCol::Id.eq(product.id))
            .filter(ProdCol::Stock.gte(*quantity))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(AppError::InsufficientStock(product.title.clone()));
        }
    }

    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    state.events.emit(AppEvent::OrderCreated {
        order_id: order.id,
        user_id: user.user_id,
        total: order.total,
    });

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_create",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id, "total": order.total })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order created successfully",
        OrderWithItems {
            order: order_from_entity(order)?,
            items: order_items,
            coupons: coupon_dtos,
        },
        Some(Meta::empty()),
    ))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderWithItems>> {
    let order = Orders::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.user_id != user.user_id && !user.is_admin() {
        return Err(AppError::Forbidden);
    }

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&state.orm)
        .await?
        .into_iter()
        .map(order_item_from_entity)
        .collect();

    let coupons = load_applied_coupons(&state.orm, order.id).await?;

    Ok(ApiResponse::success(
        "Order retrieved successfully",
        OrderWithItems {
            order: order_from_entity(order)?,
            items,
            coupons,
        },
        Some(Meta::empty()),
    ))
}

/// Cancel a pending order and compensate: restore stock for every line item,
/// release the coupon redemptions, and flip the status. One transaction; a
/// partial compensation must never become visible.
pub async fn cancel_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<Order>> {
    let txn = state.orm.begin().await?;

    let order = Orders::find_by_id(id)
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    if order.user_id != user.user_id && !user.is_admin() {
        return Err(AppError::Forbidden);
    }

    order_status(&order)?.validate_cancel()?;

    let items = OrderItems::find()
        .filter(OrderItemCol::OrderId.eq(order.id))
        .all(&txn)
        .await?;
    for item in &items {
        // Exact inverse of the creation-time decrement.
        Products::update_many()
            .col_expr(ProdCol::Stock, Expr::col(ProdCol::Stock).add(item.quantity))
            .filter(ProdCol::Id.eq(item.product_id))
            .exec(&txn)
            .await?;
    }

    let order_coupons = OrderCoupons::find()
        .filter(OrderCouponCol::OrderId.eq(order.id))
        .all(&txn)
        .await?;
    for oc in &order_coupons {
        UserCoupons::delete_many()
            .filter(UserCouponCol::UserId.eq(order.user_id))
            .filter(UserCouponCol::CouponId.eq(oc.coupon_id))
            .exec(&txn)
            .await?;
    }

    let order_user_id = order.user_id;
    let mut active: OrderActive = order.into();
    active.status = Set(OrderStatus::Cancelled.as_str().into());
    active.updated_at = Set(Utc::now().into());
    let order = active.update(&txn).await?;

    txn.commit().await?;

    state.events.emit(AppEvent::OrderCancelled {
        order_id: order.id,
        order_user_id,
    });

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "order_cancel",
        Some("orders"),
        Some(serde_json::json!({ "order_id": order.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Order cancelled successfully",
        order_from_entity(order)?,
        Some(Meta::empty()),
    ))
}

pub async fn load_applied_coupons<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> AppResult<Vec<AppliedCouponDto>> {
    let rows = OrderCoupons::find()
        .filter(OrderCouponCol::OrderId.eq(order_id))
        .find_also_related(Coupons)
        .all(conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(oc, coupon)| {
            let (code, kind, value) = coupon
                .map(|c| (c.code, c.kind, c.value))
                .unwrap_or_default();
            AppliedCouponDto {
                coupon_id: oc.coupon_id,
                code,
                kind,
                value,
                discount_amount: oc.discount_amount,
            }
        })
        .collect())
}

fn order_status(model: &OrderModel) -> AppResult<OrderStatus> {
    OrderStatus::parse(&model.status)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("unknown order status {}", model.status)))
}

pub fn order_from_entity(model: OrderModel) -> AppResult<Order> {
    let status = order_status(&model)?;
    Ok(Order {
        id: model.id,
        user_id: model.user_id,
        subtotal: model.subtotal,
        discount: model.discount,
        total: model.total,
        status,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}

pub fn order_item_from_entity(model: OrderItemModel) -> OrderItem {
    OrderItem {
        id: model.id,
        order_id: model.order_id,
        product_id: model.product_id,
        seller_id: model.seller_id,
        product_title: model.product_title,
        quantity: model.quantity,
        price_at_order: model.price_at_order,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
