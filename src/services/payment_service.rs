use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
    ActiveValue::NotSet,
    sea_query::{Expr, LockType},
};
use uuid::Uuid;

use crate::{
    audit,
    dto::payments::{
        CreatePaymentRequest, CreatePaymentResponse, PaymentStatusResponse, PaymentTransition,
        StripeKeyResponse, UpdatePaymentStatusRequest,
    },
    entity::{
        cart_items::{Column as CartCol, Entity as CartItems},
        orders::{self, ActiveModel as OrderActive, Column as OrderCol, Entity as Orders},
        users::Entity as Users,
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, Capability, authorize, ensure_admin},
    notify::{self, Notification},
    payments::{
        IntentRequest, IntentStatus, PaymentMethod, PaymentStatus, ShippingAddress,
        new_bank_transfer_id,
    },
    response::{ApiResponse, Meta},
    services::cart_service::{cart_snapshot, cart_total},
    state::AppState,
    storage::check_receipt,
};

/// Who the order rows are billed and shipped to.
#[derive(Debug, Clone)]
struct Buyer {
    name: String,
    email: Option<String>,
    tax_id: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Settlement reference returned by the selected payment path.
struct Dispatch {
    payment_id: String,
    client_secret: Option<String>,
    instructions: Option<String>,
}

/// Place an order for everything in the caller's cart.
///
/// Validation happens before the database is touched. The cart read, the
/// order inserts and the cart clear share one transaction, so either every
/// line becomes an order row or nothing changes.
pub async fn create_payment(
    state: &AppState,
    user: &AuthUser,
    payload: CreatePaymentRequest,
) -> AppResult<ApiResponse<CreatePaymentResponse>> {
    let method: PaymentMethod = payload.payment_method.parse()?;
    let address = payload.address.validate()?;

    let txn = state.orm.begin().await?;

    let profile = Users::find_by_id(user.user_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;

    let lines = cart_snapshot(&txn, user.user_id, true).await?;
    if lines.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".into()));
    }
    let total = cart_total(&lines)?;

    let buyer = Buyer {
        name: non_blank(payload.name).unwrap_or_else(|| profile.username.clone()),
        email: non_blank(payload.email).or(Some(profile.email.clone())),
        tax_id: non_blank(payload.cpf).or(profile.tax_id.clone()),
    };

    let dispatch = match method {
        PaymentMethod::Card => {
            let intent = state
                .gateway
                .create_intent(IntentRequest {
                    amount_minor: total,
                    currency: state.currency.to_string(),
                    metadata: vec![
                        ("user_id".into(), user.user_id.to_string()),
                        ("line_count".into(), lines.len().to_string()),
                    ],
                    receipt_email: buyer.email.clone(),
                })
                .await?;
            Dispatch {
                payment_id: intent.id,
                client_secret: Some(intent.client_secret),
                instructions: None,
            }
        }
        PaymentMethod::BankTransfer => Dispatch {
            payment_id: new_bank_transfer_id(),
            client_secret: None,
            instructions: Some(state.transfer_instructions.to_string()),
        },
    };

    let rows: Vec<OrderActive> = lines
        .iter()
        .map(|line| {
            order_row(
                user.user_id,
                line.product_id,
                line.quantity,
                line.line_total,
                &dispatch.payment_id,
                method,
                &address,
                &buyer,
            )
        })
        .collect();
    Orders::insert_many(rows).exec(&txn).await?;

    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;

    tracing::info!(
        payment_id = %dispatch.payment_id,
        method = %method,
        amount = total,
        lines = lines.len(),
        "checkout completed"
    );

    audit::record(
        &state.pool,
        user.user_id,
        "checkout",
        "orders",
        serde_json::json!({
            "payment_id": dispatch.payment_id,
            "payment_method": method.as_str(),
            "amount": total,
        }),
    )
    .await;

    if let Some(email) = buyer.email {
        notify::dispatch(
            state.notifier.clone(),
            Notification::OrderReceived {
                email,
                payment_id: dispatch.payment_id.clone(),
                amount_minor: total,
            },
        );
    }

    Ok(ApiResponse::success(
        "Payment created",
        CreatePaymentResponse {
            payment_id: dispatch.payment_id,
            payment_method: method,
            amount: total,
            order_count: lines.len(),
            client_secret: dispatch.client_secret,
            instructions: dispatch.instructions,
        },
        Some(Meta::empty()),
    ))
}

#[allow(clippy::too_many_arguments)]
fn order_row(
    user_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    amount: i64,
    payment_id: &str,
    method: PaymentMethod,
    address: &ShippingAddress,
    buyer: &Buyer,
) -> OrderActive {
    OrderActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        product_id: Set(product_id),
        customer: Set(buyer.name.clone()),
        quantity: Set(quantity),
        amount: Set(amount),
        payment_status: Set(PaymentStatus::Pending.as_str().to_string()),
        payment_id: Set(payment_id.to_string()),
        payment_method: Set(method.as_str().to_string()),
        address_line1: Set(address.address_line1.clone()),
        address_line2: Set(address.address_line2.clone()),
        city: Set(address.city.clone()),
        state: Set(address.state.clone()),
        postal_code: Set(address.postal_code.clone()),
        country: Set(address.country.clone()),
        tax_id: Set(buyer.tax_id.clone()),
        email: Set(buyer.email.clone()),
        receipt_path: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
}

/// All order rows sharing `payment_id`, optionally locked for update.
async fn payment_rows<C: ConnectionTrait>(
    conn: &C,
    payment_id: &str,
    lock: bool,
) -> AppResult<Vec<orders::Model>> {
    let mut query = Orders::find()
        .filter(OrderCol::PaymentId.eq(payment_id))
        .order_by_asc(OrderCol::CreatedAt);
    if lock {
        query = query.lock(LockType::Update);
    }
    let rows = query.all(conn).await?;
    if rows.is_empty() {
        return Err(AppError::NotFound);
    }
    Ok(rows)
}

struct PaymentSummary {
    owner: Uuid,
    method: PaymentMethod,
    status: PaymentStatus,
    amount: i64,
    order_count: usize,
    email: Option<String>,
}

fn summarize(rows: &[orders::Model]) -> AppResult<PaymentSummary> {
    let first = rows.first().ok_or(AppError::NotFound)?;
    let status: PaymentStatus = first.payment_status.parse()?;
    if rows.iter().any(|row| row.payment_status != first.payment_status) {
        tracing::warn!(payment_id = %first.payment_id, "order rows disagree on payment status");
    }
    Ok(PaymentSummary {
        owner: first.user_id,
        method: first.payment_method.parse()?,
        status,
        amount: rows.iter().map(|row| row.amount).sum(),
        order_count: rows.len(),
        email: first.email.clone(),
    })
}

/// Move every row of a payment to `target` inside `txn`, validating the move
/// against the current state. Returns the previous state and the number of
/// rows written (zero for a same-state write without a receipt).
async fn transition_rows(
    txn: &DatabaseTransaction,
    payment_id: &str,
    target: PaymentStatus,
) -> AppResult<(PaymentStatus, u64)> {
    let rows = payment_rows(txn, payment_id, true).await?;
    let current = summarize(&rows)?.status;
    current.transition_to(target)?;

    if current == target {
        return Ok((current, 0));
    }
    let updated = write_status(txn, payment_id, target, None).await?;
    Ok((current, updated))
}

/// Unchecked write; callers hold the row lock and have validated the move.
async fn write_status(
    txn: &DatabaseTransaction,
    payment_id: &str,
    target: PaymentStatus,
    receipt_path: Option<String>,
) -> AppResult<u64> {
    let mut update = Orders::update_many()
        .col_expr(OrderCol::PaymentStatus, Expr::value(target.as_str()))
        .col_expr(OrderCol::UpdatedAt, Expr::value(Utc::now()));
    if let Some(path) = receipt_path {
        update = update.col_expr(OrderCol::ReceiptPath, Expr::value(path));
    }
    let result = update
        .filter(OrderCol::PaymentId.eq(payment_id))
        .exec(txn)
        .await?;
    Ok(result.rows_affected)
}

async fn apply_transition(
    state: &AppState,
    payment_id: &str,
    target: PaymentStatus,
) -> AppResult<PaymentTransition> {
    let txn = state.orm.begin().await?;
    let (from, updated_rows) = transition_rows(&txn, payment_id, target).await?;
    txn.commit().await?;

    if updated_rows > 0 {
        tracing::info!(%payment_id, %from, to = %target, updated_rows, "payment status changed");
    }

    Ok(PaymentTransition {
        payment_id: payment_id.to_string(),
        from,
        to: target,
        updated_rows,
    })
}

/// Client-side card confirmation settings.
pub fn stripe_key(state: &AppState) -> ApiResponse<StripeKeyResponse> {
    ApiResponse::success(
        "OK",
        StripeKeyResponse {
            publishable_key: state.publishable_key.as_deref().map(str::to_string),
            currency: state.currency.to_string(),
        },
        Some(Meta::empty()),
    )
}

/// Polled by the buyer after checkout. Pending card payments are refreshed
/// from the processor before answering.
pub async fn payment_status(
    state: &AppState,
    user: &AuthUser,
    payment_id: &str,
) -> AppResult<ApiResponse<PaymentStatusResponse>> {
    let rows = payment_rows(&state.orm, payment_id, false).await?;
    let summary = summarize(&rows)?;
    authorize(user, Capability::ReadPayment { owner: summary.owner }).into_result()?;

    let mut status = summary.status;
    if summary.method == PaymentMethod::Card && status == PaymentStatus::Pending {
        match state.gateway.intent_status(payment_id).await {
            Ok(IntentStatus::Succeeded) => {
                status = apply_transition(state, payment_id, PaymentStatus::Completed)
                    .await?
                    .to;
                if let Some(email) = summary.email.clone() {
                    notify::dispatch(
                        state.notifier.clone(),
                        Notification::PaymentConfirmed {
                            email,
                            payment_id: payment_id.to_string(),
                        },
                    );
                }
            }
            Ok(IntentStatus::Canceled) => {
                status = apply_transition(state, payment_id, PaymentStatus::Cancelled)
                    .await?
                    .to;
            }
            Ok(IntentStatus::Processing) => {}
            Err(err) => {
                tracing::warn!(%payment_id, error = %err, "could not refresh card payment status");
            }
        }
    }

    Ok(ApiResponse::success(
        "OK",
        PaymentStatusResponse {
            payment_id: payment_id.to_string(),
            payment_method: summary.method,
            payment_status: status,
            amount: summary.amount,
            order_count: summary.order_count,
        },
        Some(Meta::empty()),
    ))
}

/// Attach a bank-transfer receipt and queue the payment for admin review.
///
/// The payment rows stay locked from the status check until commit, so the
/// file is only written for a move that is still legal. If the commit fails
/// the file is removed again.
pub async fn submit_receipt(
    state: &AppState,
    user: &AuthUser,
    payment_id: &str,
    content_type: &str,
    bytes: &[u8],
) -> AppResult<ApiResponse<PaymentTransition>> {
    check_receipt(content_type, bytes)?;

    let txn = state.orm.begin().await?;
    let rows = payment_rows(&txn, payment_id, true).await?;
    let summary = summarize(&rows)?;
    authorize(user, Capability::SubmitReceipt { owner: summary.owner }).into_result()?;

    if summary.method != PaymentMethod::BankTransfer {
        return Err(AppError::BadRequest(
            "Receipts are only accepted for bank transfers".into(),
        ));
    }
    let from = summary.status;
    let to = from.transition_to(PaymentStatus::PendingVerification)?;

    let path = state.receipts.store(payment_id, content_type, bytes).await?;

    let written = match write_status(&txn, payment_id, to, Some(path.clone())).await {
        Ok(updated) => txn.commit().await.map(|_| updated).map_err(AppError::from),
        Err(err) => Err(err),
    };
    let updated_rows = match written {
        Ok(updated) => updated,
        Err(err) => {
            if let Err(cleanup) = state.receipts.remove(&path).await {
                tracing::warn!(%payment_id, error = %cleanup, "could not remove orphaned receipt");
            }
            return Err(err);
        }
    };

    audit::record(
        &state.pool,
        user.user_id,
        "receipt_upload",
        "orders",
        serde_json::json!({ "payment_id": payment_id, "path": path }),
    )
    .await;

    Ok(ApiResponse::success(
        "Receipt received",
        PaymentTransition {
            payment_id: payment_id.to_string(),
            from,
            to,
            updated_rows,
        },
        Some(Meta::empty()),
    ))
}

/// Admin confirmation that the money for `payment_id` arrived.
pub async fn verify_payment(
    state: &AppState,
    user: &AuthUser,
    payment_id: &str,
) -> AppResult<ApiResponse<PaymentTransition>> {
    ensure_admin(user)?;
    let transition = apply_transition(state, payment_id, PaymentStatus::Completed).await?;
    after_admin_change(state, user, &transition, "payment_verify").await;
    Ok(ApiResponse::success("Payment verified", transition, Some(Meta::empty())))
}

pub async fn update_payment_status(
    state: &AppState,
    user: &AuthUser,
    payload: UpdatePaymentStatusRequest,
) -> AppResult<ApiResponse<PaymentTransition>> {
    ensure_admin(user)?;
    let target: PaymentStatus = payload.status.parse()?;
    let transition = apply_transition(state, payload.payment_id.trim(), target).await?;
    after_admin_change(state, user, &transition, "payment_status_update").await;
    Ok(ApiResponse::success("Order status updated", transition, Some(Meta::empty())))
}

async fn after_admin_change(
    state: &AppState,
    user: &AuthUser,
    transition: &PaymentTransition,
    action: &str,
) {
    audit::record(
        &state.pool,
        user.user_id,
        action,
        "orders",
        serde_json::json!({
            "payment_id": transition.payment_id,
            "from": transition.from.as_str(),
            "to": transition.to.as_str(),
        }),
    )
    .await;

    if transition.updated_rows == 0 || transition.to != PaymentStatus::Completed {
        return;
    }
    let email = Orders::find()
        .filter(OrderCol::PaymentId.eq(transition.payment_id.as_str()))
        .one(&state.orm)
        .await
        .ok()
        .flatten()
        .and_then(|row| row.email);
    if let Some(email) = email {
        notify::dispatch(
            state.notifier.clone(),
            Notification::PaymentConfirmed {
                email,
                payment_id: transition.payment_id.clone(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn row(status: &str, amount: i64) -> orders::Model {
        let now = Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap());
        orders::Model {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            product_id: Uuid::new_v4(),
            customer: "ana".into(),
            quantity: 1,
            amount,
            payment_status: status.into(),
            payment_id: "bt_1".into(),
            payment_method: "bank_transfer".into(),
            address_line1: "Rua A, 1".into(),
            address_line2: None,
            city: "Recife".into(),
            state: "PE".into(),
            postal_code: "50000000".into(),
            country: "BR".into(),
            tax_id: None,
            email: Some("ana@example.com".into()),
            receipt_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn summary_adds_line_amounts() {
        let rows = vec![row("pending", 4990), row("pending", 1500)];
        let summary = summarize(&rows).unwrap();
        assert_eq!(summary.amount, 6490);
        assert_eq!(summary.order_count, 2);
        assert_eq!(summary.status, PaymentStatus::Pending);
        assert_eq!(summary.method, PaymentMethod::BankTransfer);
    }

    #[test]
    fn summary_of_nothing_is_not_found() {
        assert!(matches!(summarize(&[]), Err(AppError::NotFound)));
    }

    #[test]
    fn buyer_fields_prefer_request_values() {
        assert_eq!(non_blank(Some("  ".into())), None);
        assert_eq!(non_blank(Some(" 123 ".into())).as_deref(), Some("123"));
        assert_eq!(non_blank(None), None);
    }
}
