use axum::{extract::FromRequestParts, http::header};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use crate::{dto::auth::Claims, error::AppError, state::AppState};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: String,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// Privileged or ownership-scoped actions.
#[derive(Debug, Clone, Copy)]
pub enum Capability {
    /// Verify payments, overwrite statuses, list every order.
    ManageOrders,
    ManageCatalog,
    /// Read settlement data belonging to `owner`.
    ReadPayment { owner: Uuid },
    /// Attach a receipt to a payment owned by `owner`.
    SubmitReceipt { owner: Uuid },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(&'static str),
}

impl AccessDecision {
    pub fn into_result(self) -> Result<(), AppError> {
        match self {
            AccessDecision::Allow => Ok(()),
            AccessDecision::Deny(reason) => Err(AppError::Forbidden(reason.into())),
        }
    }
}

pub fn authorize(user: &AuthUser, capability: Capability) -> AccessDecision {
    match capability {
        Capability::ManageOrders | Capability::ManageCatalog => {
            if user.is_admin() {
                AccessDecision::Allow
            } else {
                AccessDecision::Deny("admin role required")
            }
        }
        Capability::ReadPayment { owner } => {
            if user.is_admin() || user.user_id == owner {
                AccessDecision::Allow
            } else {
                AccessDecision::Deny("payment belongs to another user")
            }
        }
        Capability::SubmitReceipt { owner } => {
            if user.user_id == owner {
                AccessDecision::Allow
            } else {
                AccessDecision::Deny("only the buyer can submit a receipt")
            }
        }
    }
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    authorize(user, Capability::ManageOrders).into_result()
}

pub fn decode_token(token: &str, secret: &str) -> Result<AuthUser, AppError> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

    let user_id = Uuid::parse_str(&decoded.claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;

    Ok(AuthUser {
        user_id,
        username: decoded.claims.username,
        role: decoded.claims.role,
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;
    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;

        let token = auth_str
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Invalid Authorization scheme".into()))?
            .trim();

        decode_token(token, &state.jwt_secret)
    }
}
