use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        cart::{CartDto, CartItemDto},
        coupons::CouponList,
        orders::{AppliedCouponDto, OrderList, OrderWithCoupons, OrderWithItems},
        products::ProductList,
    },
    models::{Coupon, Order, OrderItem, OrderStatus, Product, User},
    response::{ApiResponse, Meta},
    routes::{admin, auth, cart, coupons, health, orders, params, products},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        products::list_products,
        products::get_product,
        products::create_product,
        products::update_product,
        products::delete_product,
        cart::get_cart,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_from_cart,
        cart::clear_cart,
        coupons::create_coupon,
        coupons::list_coupons,
        coupons::get_coupon,
        coupons::update_coupon,
        coupons::delete_coupon,
        orders::list_orders,
        orders::create_order,
        orders::get_order,
        orders::cancel_order,
        admin::list_all_orders,
        admin::update_order_status
    ),
    components(
        schemas(
            User,
            Product,
            Coupon,
            Order,
            OrderItem,
            OrderStatus,
            CartDto,
            CartItemDto,
            CouponList,
            ProductList,
            OrderList,
            OrderWithCoupons,
            OrderWithItems,
            AppliedCouponDto,
            admin::UpdateOrderStatusRequest,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            params::CouponQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<Coupon>,
            ApiResponse<CouponList>,
            ApiResponse<CartDto>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Products", description = "Product catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Coupons", description = "Coupon management endpoints"),
        (name = "Orders", description = "Order endpoints"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
