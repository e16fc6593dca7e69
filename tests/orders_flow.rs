use chrono::{Duration, Utc};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set, Statement};
use uuid::Uuid;

use marketplace_order_api::{
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{auth::RegisterRequest, cart::AddToCartRequest, orders::CreateOrderRequest},
    entity::{
        cart_items::Entity as CartItems,
        coupons::ActiveModel as CouponActive,
        products::{ActiveModel as ProductActive, Entity as Products},
        user_coupons::{Column as UserCouponCol, Entity as UserCoupons},
        users::ActiveModel as UserActive,
    },
    error::AppError,
    events::EventBus,
    middleware::auth::AuthUser,
    models::OrderStatus,
    routes::admin::UpdateOrderStatusRequest,
    services::{admin_service, auth_service, cart_service, order_service},
    state::AppState,
};

// The DB-gated tests truncate the same tables; serialize them.
static DB_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

// Integration flow: cart -> order with stacked coupons -> cancel compensation,
// then the forward-only status lifecycle under an admin.
#[tokio::test]
async fn order_coupon_and_cancel_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let _guard = DB_LOCK.lock().await;
    let state = setup_state(&database_url).await?;

    let buyer_id = create_user(&state, "user", "buyer@example.com").await?;
    let seller_id = create_user(&state, "seller", "seller@example.com").await?;
    let admin_id = create_user(&state, "admin", "admin@example.com").await?;

    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        seller_id: Set(seller_id),
        title: Set("Test Widget".into()),
        description: Set(Some("A product for testing".into())),
        price: Set(10000),
        stock: Set(10),
        deleted_at: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let coupon = CouponActive {
        id: Set(Uuid::new_v4()),
        code: Set("SAVE20".into()),
        kind: Set("percentage".into()),
        value: Set(20),
        min_amount: Set(0),
        max_discount: Set(None),
        expires_at: Set(Some((Utc::now() + Duration::days(7)).into())),
        is_active: Set(true),
        usage_limit: Set(None),
        created_by: Set(admin_id),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let buyer = AuthUser {
        user_id: buyer_id,
        role: "user".into(),
    };
    let admin = AuthUser {
        user_id: admin_id,
        role: "admin".into(),
    };

    // No cart yet.
    let err = order_service::create_order(&state, &buyer, CreateOrderRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::CartNotFound));

    // First order: 2 x 10000 with SAVE20 applied.
    cart_service::add_to_cart(
        &state,
        &buyer,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?;

    let created = order_service::create_order(
        &state,
        &buyer,
        CreateOrderRequest {
            coupon_codes: vec!["SAVE20".into()],
        },
    )
    .await?
    .data
    .unwrap();

    assert_eq!(created.order.subtotal, 20000);
    assert_eq!(created.order.discount, 4000);
    assert_eq!(created.order.total, 16000);
    assert_eq!(created.order.status, OrderStatus::Pending);
    assert_eq!(created.items.len(), 1);
    assert_eq!(created.items[0].price_at_order, 10000);
    assert_eq!(created.coupons.len(), 1);
    assert_eq!(created.coupons[0].discount_amount, 4000);

    // Stock decremented, cart cleared, redemption recorded.
    assert_eq!(product_stock(&state, product.id).await?, 8);
    let cart_items = CartItems::find().all(&state.orm).await?;
    assert!(cart_items.is_empty());
    assert_eq!(redemptions(&state, buyer_id, coupon.id).await?, 1);

    // Second order with the same coupon is rejected while the first stands.
    cart_service::add_to_cart(
        &state,
        &buyer,
        AddToCartRequest {
            product_id: product.id,
            quantity: 1,
        },
    )
    .await?;
    let err = order_service::create_order(
        &state,
        &buyer,
        CreateOrderRequest {
            coupon_codes: vec!["SAVE20".into()],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::CouponAlreadyUsed(_)));

    // The failed attempt must not have touched stock or the cart.
    assert_eq!(product_stock(&state, product.id).await?, 8);

    // Cancel the first order: stock comes back and the coupon is released.
    let cancelled = order_service::cancel_order(&state, &buyer, created.order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(product_stock(&state, product.id).await?, 10);
    assert_eq!(redemptions(&state, buyer_id, coupon.id).await?, 0);

    let err = order_service::cancel_order(&state, &buyer, created.order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyCancelled));

    // A status update validated after the cancellation committed must see
    // the cancelled row, not a stale pending snapshot.
    let err = admin_service::update_order_status(
        &state,
        &admin,
        created.order.id,
        UpdateOrderStatusRequest {
            status: "paid".into(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "Cannot update cancelled order");

    // The released coupon is redeemable again on the still-pending cart.
    let reorder = order_service::create_order(
        &state,
        &buyer,
        CreateOrderRequest {
            coupon_codes: vec!["SAVE20".into()],
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(reorder.order.subtotal, 10000);
    assert_eq!(reorder.order.discount, 2000);
    assert_eq!(reorder.order.total, 8000);
    assert_eq!(product_stock(&state, product.id).await?, 9);

    // Admin walks the order forward; cancel is no longer available.
    for status in ["paid", "shipped"] {
        let updated = admin_service::update_order_status(
            &state,
            &admin,
            reorder.order.id,
            UpdateOrderStatusRequest {
                status: status.into(),
            },
        )
        .await?
        .data
        .unwrap();
        assert_eq!(updated.status.as_str(), status);
    }

    let err = order_service::cancel_order(&state, &buyer, reorder.order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::OnlyPendingCancellable));

    // Backward move and the cancelled target are both rejected.
    let err = admin_service::update_order_status(
        &state,
        &admin,
        reorder.order.id,
        UpdateOrderStatusRequest {
            status: "paid".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InvalidTransition(_)));

    let err = admin_service::update_order_status(
        &state,
        &admin,
        reorder.order.id,
        UpdateOrderStatusRequest {
            status: "cancelled".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    // Non-admins cannot touch the status endpoint.
    let err = admin_service::update_order_status(
        &state,
        &buyer,
        reorder.order.id,
        UpdateOrderStatusRequest {
            status: "delivered".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // Delivered is terminal.
    admin_service::update_order_status(
        &state,
        &admin,
        reorder.order.id,
        UpdateOrderStatusRequest {
            status: "delivered".into(),
        },
    )
    .await?;
    let err = admin_service::update_order_status(
        &state,
        &admin,
        reorder.order.id,
        UpdateOrderStatusRequest {
            status: "shipped".into(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "Cannot update delivered order");

    // Asking for more than the remaining stock is already rejected at the cart.
    let err = cart_service::add_to_cart(
        &state,
        &buyer,
        AddToCartRequest {
            product_id: product.id,
            quantity: 50,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock(_)));

    // Plain order with no coupons discounts nothing.
    cart_service::add_to_cart(
        &state,
        &buyer,
        AddToCartRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?;
    let plain = order_service::create_order(&state, &buyer, CreateOrderRequest::default())
        .await?
        .data
        .unwrap();
    assert_eq!(plain.order.subtotal, 20000);
    assert_eq!(plain.order.discount, 0);
    assert_eq!(plain.order.total, 20000);
    assert!(plain.coupons.is_empty());
    assert_eq!(product_stock(&state, product.id).await?, 7);

    // Self-service registration may pick the seller role but never admin.
    let registered = auth_service::register_user(
        &state.pool,
        RegisterRequest {
            email: "new-seller@example.com".into(),
            password: "password123".into(),
            role: Some("seller".into()),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(registered.role, "seller");

    let err = auth_service::register_user(
        &state.pool,
        RegisterRequest {
            email: "sneaky@example.com".into(),
            password: "password123".into(),
            role: Some("admin".into()),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    Ok(())
}

// Two simultaneous orders race for the last unit; the conditional decrement
// lets at most one through.
#[tokio::test]
async fn concurrent_orders_cannot_oversell() -> anyhow::Result<()> {
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let _guard = DB_LOCK.lock().await;
    let state = setup_state(&database_url).await?;

    let seller_id = create_user(&state, "seller", "seller@example.com").await?;
    let first_id = create_user(&state, "user", "first@example.com").await?;
    let second_id = create_user(&state, "user", "second@example.com").await?;

    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        seller_id: Set(seller_id),
        title: Set("Last Unit".into()),
        description: Set(None),
        price: Set(5000),
        stock: Set(1),
        deleted_at: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let first = AuthUser {
        user_id: first_id,
        role: "user".into(),
    };
    let second = AuthUser {
        user_id: second_id,
        role: "user".into(),
    };

    for buyer in [&first, &second] {
        cart_service::add_to_cart(
            &state,
            buyer,
            AddToCartRequest {
                product_id: product.id,
                quantity: 1,
            },
        )
        .await?;
    }

    let (a, b) = tokio::join!(
        order_service::create_order(&state, &first, CreateOrderRequest::default()),
        order_service::create_order(&state, &second, CreateOrderRequest::default()),
    );

    let wins = [a.is_ok(), b.is_ok()].into_iter().filter(|ok| *ok).count();
    assert_eq!(wins, 1, "exactly one concurrent order may take the last unit");

    let loser = if a.is_ok() { b.unwrap_err() } else { a.unwrap_err() };
    assert!(matches!(loser, AppError::InsufficientStock(_)));

    assert_eq!(product_stock(&state, product.id).await?, 0);

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_coupons, order_items, orders, user_coupons, coupons, cart_items, carts, audit_logs, products, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    Ok(AppState {
        pool,
        orm,
        events: EventBus::start(),
    })
}

async fn create_user(state: &AppState, role: &str, email: &str) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        role: Set(role.into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

async fn product_stock(state: &AppState, id: Uuid) -> anyhow::Result<i32> {
    let product = Products::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| anyhow::anyhow!("product missing"))?;
    Ok(product.stock)
}

async fn redemptions(state: &AppState, user_id: Uuid, coupon_id: Uuid) -> anyhow::Result<usize> {
    let rows = UserCoupons::find()
        .filter(UserCouponCol::UserId.eq(user_id))
        .filter(UserCouponCol::CouponId.eq(coupon_id))
        .all(&state.orm)
        .await?;
    Ok(rows.len())
}
