use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::AppError;

/// Address as submitted by the client. Every field is optional so missing
/// parts produce a validation message instead of a JSON rejection.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct Address {
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// A validated address: required parts present, state upper-cased and the
/// postal code reduced to exactly eight digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShippingAddress {
    pub address_line1: String,
    pub address_line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
}

const POSTAL_CODE_DIGITS: usize = 8;

fn required(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn normalize_postal_code(raw: &str) -> Result<String, AppError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() != POSTAL_CODE_DIGITS {
        return Err(AppError::BadRequest(
            "Invalid postal code: Must be 8 digits".into(),
        ));
    }
    Ok(digits)
}

impl Address {
    pub fn validate(&self) -> Result<ShippingAddress, AppError> {
        let incomplete = || {
            AppError::BadRequest(
                "Complete address required (street, city, state, postal code, country)".into(),
            )
        };
        let address_line1 = required(&self.address_line1).ok_or_else(incomplete)?;
        let city = required(&self.city).ok_or_else(incomplete)?;
        let state = required(&self.state).ok_or_else(incomplete)?;
        let postal_code = required(&self.postal_code).ok_or_else(incomplete)?;
        let country = required(&self.country).ok_or_else(incomplete)?;

        Ok(ShippingAddress {
            address_line1,
            address_line2: required(&self.address_line2),
            city,
            state: state.to_uppercase(),
            postal_code: normalize_postal_code(&postal_code)?,
            country,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(postal_code: &str) -> Address {
        Address {
            address_line1: Some("Av. Paulista, 1000".into()),
            address_line2: None,
            city: Some("São Paulo".into()),
            state: Some("sp".into()),
            postal_code: Some(postal_code.into()),
            country: Some("BR".into()),
        }
    }

    #[test]
    fn postal_code_is_reduced_to_digits() {
        let validated = address("01310-100").validate().unwrap();
        assert_eq!(validated.postal_code, "01310100");
        assert_eq!(validated.state, "SP");
    }

    #[test]
    fn short_postal_code_is_rejected() {
        let err = address("1234").validate().unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg.contains("8 digits")));
    }

    #[test]
    fn long_postal_code_is_rejected() {
        assert!(normalize_postal_code("01310-1000").is_err());
    }

    #[test]
    fn blank_parts_count_as_missing() {
        let mut addr = address("01310100");
        addr.city = Some("   ".into());
        let err = addr.validate().unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg.starts_with("Complete address")));

        let err = Address::default().validate().unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn optional_second_line_is_trimmed() {
        let mut addr = address("01310100");
        addr.address_line2 = Some("  ".into());
        assert_eq!(addr.validate().unwrap().address_line2, None);
        addr.address_line2 = Some(" apt 12 ".into());
        assert_eq!(addr.validate().unwrap().address_line2.as_deref(), Some("apt 12"));
    }
}
