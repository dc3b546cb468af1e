use sea_orm::{
    ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

use crate::{
    dto::orders::{OrderList, PurchaseCheck},
    entity::orders::{Column as OrderCol, Entity as Orders},
    error::AppResult,
    middleware::auth::{AuthUser, Capability, authorize},
    models::Order,
    payments::PaymentStatus,
    response::{ApiResponse, Meta},
    routes::params::{OrderListQuery, SortOrder},
    state::AppState,
};

async fn find_orders(
    state: &AppState,
    owner: Option<Uuid>,
    query: OrderListQuery,
) -> AppResult<(Vec<Order>, Meta)> {
    let (page, limit, offset) = query.pagination().normalize();

    let mut condition = Condition::all();
    if let Some(owner) = owner {
        condition = condition.add(OrderCol::UserId.eq(owner));
    }
    if let Some(status) = query.status_filter()? {
        condition = condition.add(OrderCol::PaymentStatus.eq(status.as_str()));
    }

    let finder = Orders::find().filter(condition);
    let finder = match query.sort_order.unwrap_or(SortOrder::Desc) {
        SortOrder::Asc => finder.order_by_asc(OrderCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(OrderCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;

    let orders = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Order::try_from)
        .collect::<AppResult<Vec<_>>>()?;

    Ok((orders, Meta::new(page, limit, total)))
}

/// Order rows of the caller only.
pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (items, meta) = find_orders(state, Some(user.user_id), query).await?;
    Ok(ApiResponse::success("Ok", OrderList { items }, Some(meta)))
}

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    authorize(user, Capability::ManageOrders).into_result()?;
    let (items, meta) = find_orders(state, None, query).await?;
    Ok(ApiResponse::success("Orders", OrderList { items }, Some(meta)))
}

/// Whether the caller has a completed purchase of the product.
pub async fn has_purchased(state: &AppState, user_id: Uuid, product_id: Uuid) -> AppResult<bool> {
    let count = Orders::find()
        .filter(
            Condition::all()
                .add(OrderCol::UserId.eq(user_id))
                .add(OrderCol::ProductId.eq(product_id))
                .add(OrderCol::PaymentStatus.eq(PaymentStatus::Completed.as_str())),
        )
        .count(&state.orm)
        .await?;
    Ok(count > 0)
}

pub async fn check_purchase(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<PurchaseCheck>> {
    let purchased = has_purchased(state, user.user_id, product_id).await?;
    Ok(ApiResponse::success(
        "OK",
        PurchaseCheck { purchased },
        Some(Meta::empty()),
    ))
}
