use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::payments::{Address, PaymentMethod, PaymentStatus};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    /// `card` or `bank_transfer`. Kept as text so unknown values get a 400 with a reason.
    pub payment_method: String,
    #[serde(default)]
    pub address: Address,
    /// Buyer name, defaults to the username.
    pub name: Option<String>,
    /// CPF, overrides the profile tax id.
    pub cpf: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatePaymentResponse {
    pub payment_id: String,
    pub payment_method: PaymentMethod,
    pub amount: i64,
    pub order_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentStatusResponse {
    pub payment_id: String,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub amount: i64,
    pub order_count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StripeKeyResponse {
    /// Absent when card payments run against the in-memory processor.
    pub publishable_key: Option<String>,
    pub currency: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePaymentStatusRequest {
    pub payment_id: String,
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentTransition {
    pub payment_id: String,
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub updated_rows: u64,
}
