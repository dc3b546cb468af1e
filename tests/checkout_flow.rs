use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, EntityTrait, QueryFilter, Set};
use storefront_checkout::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{
        cart::AddToCartRequest,
        payments::{CreatePaymentRequest, UpdatePaymentStatusRequest},
        reviews::ReviewRequest,
    },
    entity::{
        orders::{Column as OrderCol, Entity as Orders},
        products::ActiveModel as ProductActive,
        users::ActiveModel as UserActive,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ROLE_ADMIN, ROLE_USER},
    payments::{
        Address, IntentRequest, IntentStatus, MockGateway, PaymentGateway, PaymentIntent,
        PaymentMethod, PaymentStatus, to_minor_units,
    },
    routes::params::OrderListQuery,
    services::{cart_service, order_service, payment_service, review_service},
    state::AppState,
    storage::LocalReceiptStore,
};
use uuid::Uuid;

/// Processor that is always down.
struct UnavailableGateway;

#[async_trait]
impl PaymentGateway for UnavailableGateway {
    async fn create_intent(&self, _request: IntentRequest) -> AppResult<PaymentIntent> {
        Err(AppError::Gateway("processor unavailable".into()))
    }

    async fn intent_status(&self, _intent_id: &str) -> AppResult<IntentStatus> {
        Err(AppError::Gateway("processor unavailable".into()))
    }
}

// Integration flow against a real Postgres. Every fixture uses fresh ids, so
// the database does not need to be empty.
#[tokio::test]
async fn checkout_and_settlement_flow() -> anyhow::Result<()> {
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

    let gateway = Arc::new(MockGateway::new());
    let receipt_dir = std::env::temp_dir().join(format!("storefront-receipts-{}", Uuid::new_v4()));
    let state = setup_state(&database_url)
        .await?
        .with_gateway(gateway.clone())
        .with_receipts(Arc::new(LocalReceiptStore::new(&receipt_dir)));

    let shirt = create_product(&state, "Camiseta", 49.90).await?;
    let mug = create_product(&state, "Caneca", 35.00).await?;

    let ana = create_user(&state, "ana", ROLE_USER).await?;
    let bia = create_user(&state, "bia", ROLE_USER).await?;
    let admin = create_user(&state, "admin", ROLE_ADMIN).await?;

    // bank transfer: two cart lines become two order rows sharing one payment id
    add(&state, &ana, shirt, 2).await?;
    add(&state, &ana, mug, 1).await?;
    add(&state, &bia, mug, 3).await?;

    let created = payment_service::create_payment(&state, &ana, checkout("bank_transfer"))
        .await?
        .data
        .unwrap();
    assert!(created.payment_id.starts_with("bt_"));
    assert_eq!(created.payment_method, PaymentMethod::BankTransfer);
    assert_eq!(created.order_count, 2);
    assert_eq!(created.amount, 4990 * 2 + 3500);
    assert!(created.client_secret.is_none());
    assert!(created.instructions.is_some());

    let rows = Orders::find()
        .filter(OrderCol::PaymentId.eq(created.payment_id.as_str()))
        .all(&state.orm)
        .await?;
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.payment_status == "pending" && r.user_id == ana.user_id));
    assert!(rows.iter().all(|r| r.state == "SP" && r.postal_code == "01310100"));

    // cart is consumed, other carts untouched
    let ana_cart = cart_service::list_cart(&state, &ana).await?.data.unwrap();
    assert!(ana_cart.items.is_empty());
    let bia_cart = cart_service::list_cart(&state, &bia).await?.data.unwrap();
    assert_eq!(bia_cart.items.len(), 1);
    assert_eq!(bia_cart.total, 3 * 3500);

    let again = payment_service::create_payment(&state, &ana, checkout("bank_transfer")).await;
    assert!(matches!(again, Err(AppError::BadRequest(msg)) if msg.contains("Cart is empty")));

    let bia_orders = order_service::list_orders(&state, &bia, all_orders())
        .await?
        .data
        .unwrap();
    assert!(bia_orders.items.is_empty());
    let ana_orders = order_service::list_orders(&state, &ana, all_orders())
        .await?
        .data
        .unwrap();
    assert_eq!(ana_orders.items.len(), 2);

    // only the buyer reads the status
    let denied = payment_service::payment_status(&state, &bia, &created.payment_id).await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    // no review before the purchase completes
    let early = review_service::upsert_review(&state, &ana, review(shirt)).await;
    assert!(matches!(early, Err(AppError::Forbidden(_))));

    // receipt -> pending_verification -> verified
    let uploaded = payment_service::submit_receipt(
        &state,
        &ana,
        &created.payment_id,
        "image/png",
        b"\x89PNG fake receipt",
    )
    .await?
    .data
    .unwrap();
    assert_eq!(uploaded.from, PaymentStatus::Pending);
    assert_eq!(uploaded.to, PaymentStatus::PendingVerification);
    assert_eq!(uploaded.updated_rows, 2);

    let stored = Orders::find()
        .filter(OrderCol::PaymentId.eq(created.payment_id.as_str()))
        .all(&state.orm)
        .await?;
    let receipt_path = stored[0].receipt_path.clone().expect("receipt path");
    assert!(stored.iter().all(|r| r.receipt_path.as_deref() == Some(receipt_path.as_str())));
    assert!(receipt_path.starts_with(receipt_dir.to_string_lossy().as_ref()));
    assert!(tokio::fs::metadata(&receipt_path).await.is_ok());

    let not_admin = payment_service::verify_payment(&state, &ana, &created.payment_id).await;
    assert!(matches!(not_admin, Err(AppError::Forbidden(_))));

    let verified = payment_service::verify_payment(&state, &admin, &created.payment_id)
        .await?
        .data
        .unwrap();
    assert_eq!(verified.to, PaymentStatus::Completed);
    assert_eq!(verified.updated_rows, 2);

    // terminal state cannot move backwards
    let backwards = payment_service::update_payment_status(
        &state,
        &admin,
        UpdatePaymentStatusRequest {
            payment_id: created.payment_id.clone(),
            status: "pending".into(),
        },
    )
    .await;
    assert!(matches!(backwards, Err(AppError::InvalidTransition { .. })));

    let status = payment_service::payment_status(&state, &ana, &created.payment_id)
        .await?
        .data
        .unwrap();
    assert_eq!(status.payment_status, PaymentStatus::Completed);
    assert_eq!(status.amount, 4990 * 2 + 3500);

    let reviewed = review_service::upsert_review(&state, &ana, review(shirt))
        .await?
        .data
        .unwrap();
    assert!(!reviewed.updated);

    // card: amount sent to the processor is in minor units
    let card = payment_service::create_payment(&state, &bia, checkout("card"))
        .await?
        .data
        .unwrap();
    assert_eq!(card.amount, 10500);
    assert!(card.client_secret.is_some());
    assert_eq!(gateway.requests().last().map(|r| r.amount_minor), Some(10500));

    let polled = payment_service::payment_status(&state, &bia, &card.payment_id)
        .await?
        .data
        .unwrap();
    assert_eq!(polled.payment_status, PaymentStatus::Pending);

    gateway.settle(&card.payment_id, IntentStatus::Succeeded);
    let polled = payment_service::payment_status(&state, &bia, &card.payment_id)
        .await?
        .data
        .unwrap();
    assert_eq!(polled.payment_status, PaymentStatus::Completed);

    // receipts are for bank transfers only
    let wrong_method =
        payment_service::submit_receipt(&state, &bia, &card.payment_id, "image/png", b"x").await;
    assert!(matches!(wrong_method, Err(AppError::BadRequest(_))));

    // card price conversion
    let single = create_product(&state, "Boné", 49.90).await?;
    add(&state, &bia, single, 1).await?;
    let card = payment_service::create_payment(&state, &bia, checkout("credit_card"))
        .await?
        .data
        .unwrap();
    assert_eq!(card.amount, 4990);
    assert_eq!(gateway.requests().last().map(|r| r.amount_minor), Some(4990));

    // cancellation from pending is allowed, after that the state is frozen
    let cancelled = payment_service::update_payment_status(
        &state,
        &admin,
        UpdatePaymentStatusRequest {
            payment_id: card.payment_id.clone(),
            status: "cancelled".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(cancelled.from, PaymentStatus::Pending);
    assert_eq!(cancelled.updated_rows, 1);

    let revived = payment_service::verify_payment(&state, &admin, &card.payment_id).await;
    assert!(matches!(revived, Err(AppError::InvalidTransition { .. })));

    let missing = payment_service::payment_status(&state, &admin, "bt_missing").await;
    assert!(matches!(missing, Err(AppError::NotFound)));

    // a processor failure after the cart is locked leaves no trace
    let cris = create_user(&state, "cris", ROLE_USER).await?;
    add(&state, &cris, shirt, 1).await?;
    add(&state, &cris, mug, 2).await?;
    let offline = state.clone().with_gateway(Arc::new(UnavailableGateway));
    let failed = payment_service::create_payment(&offline, &cris, checkout("card")).await;
    assert!(matches!(failed, Err(AppError::Gateway(_))));

    let cris_rows = Orders::find()
        .filter(OrderCol::UserId.eq(cris.user_id))
        .all(&state.orm)
        .await?;
    assert!(cris_rows.is_empty());
    let cris_cart = cart_service::list_cart(&state, &cris).await?.data.unwrap();
    assert_eq!(cris_cart.items.len(), 2);
    assert_eq!(cris_cart.total, 4990 + 2 * 3500);

    // the cart lock is released, so a later checkout goes through
    let retried = payment_service::create_payment(&state, &cris, checkout("bank_transfer"))
        .await?
        .data
        .unwrap();
    assert_eq!(retried.order_count, 2);

    // a receipt for a cancelled transfer is refused before anything is stored
    let dropped = payment_service::update_payment_status(
        &state,
        &admin,
        UpdatePaymentStatusRequest {
            payment_id: retried.payment_id.clone(),
            status: "cancelled".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(dropped.to, PaymentStatus::Cancelled);
    let late = payment_service::submit_receipt(
        &state,
        &cris,
        &retried.payment_id,
        "application/pdf",
        b"%PDF late receipt",
    )
    .await;
    assert!(matches!(late, Err(AppError::InvalidTransition { .. })));
    let orphan = receipt_dir.join(format!("{}.pdf", retried.payment_id));
    assert!(tokio::fs::metadata(&orphan).await.is_err());

    let _ = tokio::fs::remove_dir_all(&receipt_dir).await;

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    run_migrations(&create_orm_conn(&pool)).await?;

    let config = AppConfig {
        database_url: database_url.to_string(),
        host: "127.0.0.1".into(),
        port: 0,
        jwt_secret: "flow-test-secret".into(),
        currency: "brl".into(),
        stripe_secret_key: None,
        stripe_api_base: "http://127.0.0.1:1".into(),
        stripe_publishable_key: Some("pk_test_storefront".into()),
        receipt_dir: std::env::temp_dir()
            .join(format!("storefront-receipts-{}", Uuid::new_v4()))
            .to_string_lossy()
            .into_owned(),
        transfer_instructions: "Transfer and upload the receipt".into(),
    };
    Ok(AppState::from_config(&config, pool))
}

async fn create_user(state: &AppState, name: &str, role: &str) -> anyhow::Result<AuthUser> {
    let id = Uuid::new_v4();
    let username = format!("{name}-{}", id.simple());
    UserActive {
        id: Set(id),
        username: Set(username.clone()),
        email: Set(format!("{username}@example.com")),
        password_hash: Set("not-a-real-hash".into()),
        role: Set(role.into()),
        tax_id: Set(Some("12345678909".into())),
        phone_number: Set(None),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(AuthUser {
        user_id: id,
        username,
        role: role.into(),
    })
}

async fn create_product(state: &AppState, name: &str, price: f64) -> anyhow::Result<Uuid> {
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        name: Set(format!("{name} {}", Uuid::new_v4().simple())),
        description: Set(None),
        price: Set(to_minor_units(price)?),
        image_url: Set("/images/default.jpg".into()),
        category: Set("test".into()),
        created_at: NotSet,
    }
    .insert(&state.orm)
    .await?;
    Ok(product.id)
}

async fn add(state: &AppState, user: &AuthUser, product_id: Uuid, quantity: i32) -> anyhow::Result<()> {
    cart_service::add_to_cart(
        state,
        user,
        AddToCartRequest {
            product_id,
            quantity: Some(quantity),
        },
    )
    .await?;
    Ok(())
}

fn checkout(method: &str) -> CreatePaymentRequest {
    CreatePaymentRequest {
        payment_method: method.into(),
        address: Address {
            address_line1: Some("Av. Paulista, 1000".into()),
            address_line2: None,
            city: Some("São Paulo".into()),
            state: Some("sp".into()),
            postal_code: Some("01310-100".into()),
            country: Some("BR".into()),
        },
        name: None,
        cpf: None,
        email: None,
    }
}

fn all_orders() -> OrderListQuery {
    OrderListQuery {
        page: None,
        per_page: None,
        status: None,
        sort_order: None,
    }
}

fn review(product_id: Uuid) -> ReviewRequest {
    ReviewRequest {
        product_id,
        rating: 5,
        comment: Some("Ótima".into()),
    }
}
