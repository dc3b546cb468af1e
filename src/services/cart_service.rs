use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, Condition, EntityTrait, FromQueryResult,
    JoinType, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set,
    ActiveValue::NotSet, sea_query::LockType,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::cart::{AddToCartRequest, CartLine, CartList, UpdateCartRequest},
    entity::{
        cart_items::{self, ActiveModel as CartActive, Column as CartCol, Entity as CartItems},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::CartItem,
    response::{ApiResponse, Meta},
    state::AppState,
};

#[derive(Debug, FromQueryResult)]
struct CartLineRow {
    product_id: Uuid,
    quantity: i32,
    name: String,
    image_url: String,
    unit_price: i64,
}

/// Read the user's cart joined with current catalog prices. With `lock` the
/// rows stay locked until the surrounding transaction ends.
pub async fn cart_snapshot<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    lock: bool,
) -> AppResult<Vec<CartLine>> {
    let mut query = CartItems::find()
        .select_only()
        .column(CartCol::ProductId)
        .column(CartCol::Quantity)
        .column_as(ProdCol::Name, "name")
        .column_as(ProdCol::ImageUrl, "image_url")
        .column_as(ProdCol::Price, "unit_price")
        .join(JoinType::InnerJoin, cart_items::Relation::Products.def())
        .filter(CartCol::UserId.eq(user_id))
        .order_by_asc(CartCol::CreatedAt);
    if lock {
        query = query.lock(LockType::Update);
    }

    let rows = query.into_model::<CartLineRow>().all(conn).await?;

    rows.into_iter()
        .map(|row| {
            let line_total = row
                .unit_price
                .checked_mul(i64::from(row.quantity))
                .ok_or_else(|| AppError::BadRequest("Cart line amount overflows".into()))?;
            Ok(CartLine {
                product_id: row.product_id,
                name: row.name,
                image_url: row.image_url,
                unit_price: row.unit_price,
                quantity: row.quantity,
                line_total,
            })
        })
        .collect()
}

/// Σ(unit_price × quantity) over the snapshot.
pub fn cart_total(lines: &[CartLine]) -> AppResult<i64> {
    lines.iter().try_fold(0i64, |acc, line| {
        if line.quantity < 1 {
            return Err(AppError::BadRequest("Cart has invalid quantity".into()));
        }
        line.unit_price
            .checked_mul(i64::from(line.quantity))
            .and_then(|amount| acc.checked_add(amount))
            .ok_or_else(|| AppError::BadRequest("Cart total overflows".into()))
    })
}

pub async fn list_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartList>> {
    let items = cart_snapshot(&state.orm, user.user_id, false).await?;
    let total = cart_total(&items)?;
    let meta = Meta::total(items.len() as i64);
    Ok(ApiResponse::success("OK", CartList { items, total }, Some(meta)))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    let quantity = payload.quantity.unwrap_or(1);
    if quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    if Products::find_by_id(payload.product_id)
        .one(&state.orm)
        .await?
        .is_none()
    {
        return Err(AppError::NotFound);
    }

    let exist = CartItems::find()
        .filter(
            Condition::all()
                .add(CartCol::UserId.eq(user.user_id))
                .add(CartCol::ProductId.eq(payload.product_id)),
        )
        .one(&state.orm)
        .await?;

    let cart_item = match exist {
        Some(item) => {
            let new_quantity = item
                .quantity
                .checked_add(quantity)
                .ok_or_else(|| AppError::BadRequest("quantity is too large".into()))?;
            let mut active: CartActive = item.into();
            active.quantity = Set(new_quantity);
            active.update(&state.orm).await?
        }
        None => {
            CartActive {
                id: Set(Uuid::new_v4()),
                user_id: Set(user.user_id),
                product_id: Set(payload.product_id),
                quantity: Set(quantity),
                created_at: NotSet,
            }
            .insert(&state.orm)
            .await?
        }
    };

    audit::record(
        &state.pool,
        user.user_id,
        "cart_update",
        "cart_items",
        serde_json::json!({ "product_id": payload.product_id, "quantity": cart_item.quantity }),
    )
    .await;

    Ok(ApiResponse::success("Item added to cart", CartItem::from(cart_item), None))
}

pub async fn update_quantity(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
    payload: UpdateCartRequest,
) -> AppResult<ApiResponse<CartItem>> {
    if payload.quantity < 1 {
        return Err(AppError::BadRequest("Quantity must be at least 1".into()));
    }

    let item = CartItems::find()
        .filter(
            Condition::all()
                .add(CartCol::UserId.eq(user.user_id))
                .add(CartCol::ProductId.eq(product_id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut active: CartActive = item.into();
    active.quantity = Set(payload.quantity);
    let item = active.update(&state.orm).await?;

    Ok(ApiResponse::success("Cart updated", CartItem::from(item), None))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = CartItems::delete_many()
        .filter(
            Condition::all()
                .add(CartCol::UserId.eq(user.user_id))
                .add(CartCol::ProductId.eq(product_id)),
        )
        .exec(&state.orm)
        .await?;

    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }

    audit::record(
        &state.pool,
        user.user_id,
        "cart_remove",
        "cart_items",
        serde_json::json!({ "product_id": product_id }),
    )
    .await;

    Ok(ApiResponse::ack("Item removed from cart"))
}

pub async fn clear_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    CartItems::delete_many()
        .filter(CartCol::UserId.eq(user.user_id))
        .exec(&state.orm)
        .await?;
    Ok(ApiResponse::ack("Cart cleared"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(unit_price: i64, quantity: i32) -> CartLine {
        CartLine {
            product_id: Uuid::new_v4(),
            name: "Camisa".into(),
            image_url: "/images/default.jpg".into(),
            unit_price,
            quantity,
            line_total: unit_price * i64::from(quantity),
        }
    }

    #[test]
    fn total_is_sum_of_price_times_quantity() {
        let lines = vec![line(4990, 2), line(12000, 1), line(50, 3)];
        assert_eq!(cart_total(&lines).unwrap(), 4990 * 2 + 12000 + 150);
        assert_eq!(cart_total(&[]).unwrap(), 0);
    }

    #[test]
    fn total_rejects_bad_quantities_and_overflow() {
        assert!(cart_total(&[line(100, 0)]).is_err());
        let huge = CartLine {
            unit_price: i64::MAX,
            ..line(1, 2)
        };
        assert!(cart_total(&[huge]).is_err());
    }
}
