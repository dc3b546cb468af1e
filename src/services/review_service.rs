use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, FromQueryResult, JoinType,
    QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, ActiveValue::NotSet,
};
use uuid::Uuid;

use crate::{
    audit,
    dto::reviews::{ReviewList, ReviewRequest, ReviewUpsert, ReviewWithAuthor},
    entity::{
        reviews::{self, ActiveModel as ReviewActive, Column as ReviewCol, Entity as Reviews},
        users::Column as UserCol,
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Review,
    response::{ApiResponse, Meta},
    services::order_service::has_purchased,
    state::AppState,
};

#[derive(Debug, FromQueryResult)]
struct ReviewRow {
    id: Uuid,
    product_id: Uuid,
    user_id: Uuid,
    username: String,
    rating: i32,
    comment: Option<String>,
    created_at: sea_orm::prelude::DateTimeWithTimeZone,
}

/// Insert or replace the caller's review of a product they bought.
pub async fn upsert_review(
    state: &AppState,
    user: &AuthUser,
    payload: ReviewRequest,
) -> AppResult<ApiResponse<ReviewUpsert>> {
    if !(1..=5).contains(&payload.rating) {
        return Err(AppError::BadRequest("rating must be between 1 and 5".into()));
    }
    if !has_purchased(state, user.user_id, payload.product_id).await? {
        return Err(AppError::Forbidden(
            "You must purchase this product to review it".into(),
        ));
    }

    let comment = payload.comment.filter(|c| !c.trim().is_empty());
    let existing = Reviews::find()
        .filter(
            Condition::all()
                .add(ReviewCol::ProductId.eq(payload.product_id))
                .add(ReviewCol::UserId.eq(user.user_id)),
        )
        .one(&state.orm)
        .await?;

    let (review, updated) = match existing {
        Some(review) => {
            let mut active: ReviewActive = review.into();
            active.rating = Set(payload.rating);
            active.comment = Set(comment);
            active.created_at = Set(Utc::now().into());
            (active.update(&state.orm).await?, true)
        }
        None => {
            let review = ReviewActive {
                id: Set(Uuid::new_v4()),
                product_id: Set(payload.product_id),
                user_id: Set(user.user_id),
                rating: Set(payload.rating),
                comment: Set(comment),
                created_at: NotSet,
            }
            .insert(&state.orm)
            .await?;
            (review, false)
        }
    };

    audit::record(
        &state.pool,
        user.user_id,
        "review_upsert",
        "reviews",
        serde_json::json!({ "product_id": review.product_id, "updated": updated }),
    )
    .await;

    let message = if updated { "Review updated" } else { "Review submitted" };
    Ok(ApiResponse::success(
        message,
        ReviewUpsert {
            review: Review::from(review),
            updated,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_reviews(state: &AppState, product_id: Uuid) -> AppResult<ApiResponse<ReviewList>> {
    let items: Vec<ReviewWithAuthor> = Reviews::find()
        .select_only()
        .column(ReviewCol::Id)
        .column(ReviewCol::ProductId)
        .column(ReviewCol::UserId)
        .column_as(UserCol::Username, "username")
        .column(ReviewCol::Rating)
        .column(ReviewCol::Comment)
        .column(ReviewCol::CreatedAt)
        .join(JoinType::InnerJoin, reviews::Relation::Users.def())
        .filter(ReviewCol::ProductId.eq(product_id))
        .order_by_desc(ReviewCol::CreatedAt)
        .into_model::<ReviewRow>()
        .all(&state.orm)
        .await?
        .into_iter()
        .map(|row| ReviewWithAuthor {
            id: row.id,
            product_id: row.product_id,
            user_id: row.user_id,
            username: row.username,
            rating: row.rating,
            comment: row.comment,
            created_at: row.created_at.with_timezone(&Utc),
        })
        .collect();

    let meta = Meta::total(items.len() as i64);
    Ok(ApiResponse::success("OK", ReviewList { items }, Some(meta)))
}

pub async fn delete_review(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = Reviews::delete_many()
        .filter(
            Condition::all()
                .add(ReviewCol::ProductId.eq(product_id))
                .add(ReviewCol::UserId.eq(user.user_id)),
        )
        .exec(&state.orm)
        .await?;
    if result.rows_affected == 0 {
        return Err(AppError::NotFound);
    }
    Ok(ApiResponse::ack("Review deleted"))
}
