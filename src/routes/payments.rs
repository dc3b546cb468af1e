use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, header},
    routing::{get, post},
};

use crate::{
    dto::payments::{
        CreatePaymentRequest, CreatePaymentResponse, PaymentStatusResponse, PaymentTransition,
        StripeKeyResponse,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

/// Largest receipt upload accepted. Overrides axum's 2 MiB default for `Bytes`.
pub const MAX_RECEIPT_BYTES: usize = 5 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_payment))
        .route("/stripe-key", get(stripe_key))
        .route("/{payment_id}/status", get(payment_status))
        .route(
            "/{payment_id}/receipt",
            post(upload_receipt).layer(DefaultBodyLimit::max(MAX_RECEIPT_BYTES)),
        )
}

#[utoipa::path(
    post,
    path = "/api/payments",
    request_body = CreatePaymentRequest,
    responses(
        (status = 200, description = "Orders created; card payments return a client secret, bank transfers a payment id and instructions", body = ApiResponse<CreatePaymentResponse>),
        (status = 400, description = "Invalid payment method, address or empty cart"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "User not found"),
        (status = 502, description = "Card processor error"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreatePaymentRequest>,
) -> AppResult<Json<ApiResponse<CreatePaymentResponse>>> {
    let resp = payment_service::create_payment(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/payments/{payment_id}/status",
    params(("payment_id" = String, Path, description = "Payment ID shared by the order rows")),
    responses(
        (status = 200, description = "Current payment status", body = ApiResponse<PaymentStatusResponse>),
        (status = 403, description = "Payment belongs to another user"),
        (status = 404, description = "Payment not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn payment_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(payment_id): Path<String>,
) -> AppResult<Json<ApiResponse<PaymentStatusResponse>>> {
    let resp = payment_service::payment_status(&state, &user, &payment_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/{payment_id}/receipt",
    params(("payment_id" = String, Path, description = "Bank transfer payment ID")),
    request_body(content = Vec<u8>, description = "Receipt file (JPEG, PNG or PDF)", content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Receipt stored, payment awaits verification", body = ApiResponse<PaymentTransition>),
        (status = 400, description = "Invalid file or not a bank transfer"),
        (status = 413, description = "Receipt larger than 5 MiB"),
        (status = 403, description = "Not the buyer"),
        (status = 404, description = "Payment not found"),
        (status = 409, description = "Payment already settled"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn upload_receipt(
    State(state): State<AppState>,
    user: AuthUser,
    Path(payment_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ApiResponse<PaymentTransition>>> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let resp =
        payment_service::submit_receipt(&state, &user, &payment_id, content_type, &body).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/payments/stripe-key",
    responses(
        (status = 200, description = "Publishable key and currency for client-side card confirmation", body = ApiResponse<StripeKeyResponse>),
    ),
    tag = "Payments"
)]
pub async fn stripe_key(State(state): State<AppState>) -> Json<ApiResponse<StripeKeyResponse>> {
    Json(payment_service::stripe_key(&state))
}
