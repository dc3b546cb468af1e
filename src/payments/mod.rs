//! Payment domain: method allow-list, the payment status state machine,
//! amount conversion and settlement id generation.

pub mod address;
pub mod gateway;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

pub use address::{Address, ShippingAddress};
pub use gateway::{IntentRequest, IntentStatus, MockGateway, PaymentGateway, PaymentIntent, StripeGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "card" | "credit_card" => Ok(PaymentMethod::Card),
            "bank_transfer" | "pix" => Ok(PaymentMethod::BankTransfer),
            _ => Err(AppError::BadRequest("Invalid payment method".into())),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settlement state shared by every order row of one checkout.
///
/// Allowed moves: forward along pending -> pending_verification -> completed
/// (skipping the middle state is allowed), and to cancelled from either
/// pending state. Completed and cancelled are terminal. Writing the current
/// state again is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    PendingVerification,
    Completed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::PendingVerification => "pending_verification",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            PaymentStatus::Pending => 0,
            PaymentStatus::PendingVerification => 1,
            PaymentStatus::Completed => 2,
            PaymentStatus::Cancelled => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        if *self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        match next {
            PaymentStatus::Cancelled => true,
            _ => next.rank() > self.rank(),
        }
    }

    /// Validate a move, returning the target state.
    pub fn transition_to(self, next: PaymentStatus) -> Result<PaymentStatus, AppError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AppError::InvalidTransition { from: self, to: next })
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "pending" => Ok(PaymentStatus::Pending),
            "pending_verification" => Ok(PaymentStatus::PendingVerification),
            "completed" => Ok(PaymentStatus::Completed),
            "cancelled" => Ok(PaymentStatus::Cancelled),
            _ => Err(AppError::BadRequest("Invalid payment status".into())),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert a decimal amount to minor currency units, rounding half up.
pub fn to_minor_units(amount: f64) -> Result<i64, AppError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::BadRequest("Amount must be a positive number".into()));
    }
    // Route through the shortest decimal representation so 49.90 (stored as
    // 49.899999...) still lands on 4990.
    let scaled: f64 = format!("{amount}e2")
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid amount".into()))?;
    let minor = (scaled + 0.5).floor();
    if minor < 1.0 {
        return Err(AppError::BadRequest("Amount is below the smallest currency unit".into()));
    }
    if minor > i64::MAX as f64 {
        return Err(AppError::BadRequest("Amount is too large".into()));
    }
    Ok(minor as i64)
}

/// Settlement id for the bank-transfer path: 128 bits from the OS RNG.
pub fn new_bank_transfer_id() -> String {
    format!("bt_{}", Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    use PaymentStatus::*;

    #[test]
    fn method_allow_list() {
        assert_eq!("card".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
        assert_eq!(
            "bank_transfer".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::BankTransfer
        );
        assert_eq!("pix".parse::<PaymentMethod>().unwrap(), PaymentMethod::BankTransfer);
        assert!(matches!(
            "boleto".parse::<PaymentMethod>(),
            Err(AppError::BadRequest(_))
        ));
        assert!("".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn status_moves_forward_only() {
        assert!(Pending.can_transition_to(PendingVerification));
        assert!(Pending.can_transition_to(Completed));
        assert!(PendingVerification.can_transition_to(Completed));
        assert!(!PendingVerification.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(PendingVerification));
    }

    #[test]
    fn cancel_only_from_pending_states() {
        assert!(Pending.can_transition_to(Cancelled));
        assert!(PendingVerification.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Completed));
    }

    #[test]
    fn same_state_is_a_no_op() {
        for status in [Pending, PendingVerification, Completed, Cancelled] {
            assert_eq!(status.transition_to(status).unwrap(), status);
        }
    }

    #[test]
    fn completed_back_to_pending_is_rejected() {
        let err = Completed.transition_to(Pending).unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: Completed,
                to: Pending
            }
        ));
    }

    #[test]
    fn minor_units_round_half_up() {
        assert_eq!(to_minor_units(49.90).unwrap(), 4990);
        assert_eq!(to_minor_units(0.015).unwrap(), 2);
        assert_eq!(to_minor_units(10.0).unwrap(), 1000);
        assert_eq!(to_minor_units(19.994).unwrap(), 1999);
        assert_eq!(to_minor_units(19.995).unwrap(), 2000);
        assert!(to_minor_units(0.0).is_err());
        assert!(to_minor_units(-3.5).is_err());
        assert!(to_minor_units(f64::NAN).is_err());
    }

    #[test]
    fn bank_transfer_ids_are_unique_and_opaque() {
        let a = new_bank_transfer_id();
        let b = new_bank_transfer_id();
        assert_ne!(a, b);
        assert!(a.starts_with("bt_"));
        assert_eq!(a.len(), 3 + 32);
        assert!(a[3..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn status_round_trips_through_text() {
        assert_eq!("pending_verification".parse::<PaymentStatus>().unwrap(), PendingVerification);
        assert_eq!(Completed.to_string(), "completed");
        assert!("paid".parse::<PaymentStatus>().is_err());
    }
}
