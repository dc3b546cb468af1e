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
        auth::{LoginRequest, LoginResponse, Principal, RegisterRequest},
        cart::{AddToCartRequest, CartLine, CartList, UpdateCartRequest},
        orders::{OrderList, PurchaseCheck},
        payments::{
            CreatePaymentRequest, CreatePaymentResponse, PaymentStatusResponse,
            PaymentTransition, StripeKeyResponse, UpdatePaymentStatusRequest,
        },
        products::{CreateProductRequest, ProductList},
        reviews::{ReviewList, ReviewRequest, ReviewUpsert, ReviewWithAuthor},
    },
    models::{CartItem, Order, Product, Review, User},
    payments::{Address, PaymentMethod, PaymentStatus},
    response::{ApiResponse, Meta},
    routes::{admin, auth, cart, health, orders, params, payments, products, reviews},
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
        auth::register,
        auth::login,
        auth::me,
        products::list_products,
        products::get_product,
        cart::cart_list,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_from_cart,
        cart::clear_cart,
        payments::create_payment,
        payments::payment_status,
        payments::upload_receipt,
        payments::stripe_key,
        orders::list_orders,
        orders::check_purchase,
        reviews::upsert_review,
        reviews::list_reviews,
        reviews::delete_review,
        admin::list_all_orders,
        admin::verify_payment,
        admin::update_payment_status,
        admin::create_product,
        admin::delete_product
    ),
    components(
        schemas(
            User,
            Product,
            CartItem,
            Order,
            Review,
            Address,
            PaymentMethod,
            PaymentStatus,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            Principal,
            AddToCartRequest,
            UpdateCartRequest,
            CartLine,
            CartList,
            CreatePaymentRequest,
            CreatePaymentResponse,
            PaymentStatusResponse,
            PaymentTransition,
            StripeKeyResponse,
            UpdatePaymentStatusRequest,
            OrderList,
            PurchaseCheck,
            CreateProductRequest,
            ProductList,
            ReviewRequest,
            ReviewUpsert,
            ReviewWithAuthor,
            ReviewList,
            params::Pagination,
            params::ProductQuery,
            params::OrderListQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<CartList>,
            ApiResponse<CreatePaymentResponse>,
            ApiResponse<PaymentStatusResponse>,
            ApiResponse<PaymentTransition>,
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
        (name = "Products", description = "Catalog endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Payments", description = "Checkout and settlement endpoints"),
        (name = "Orders", description = "Order history endpoints"),
        (name = "Reviews", description = "Review endpoints"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
