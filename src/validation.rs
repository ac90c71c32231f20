// ✅ Validation - Identifier and price checks before any network call

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Barcode cannot be empty")]
    InvalidIdentifier,

    #[error("Invalid price format: {input} ({reason})")]
    InvalidPrice { input: String, reason: String },
}

// ============================================================================
// RAW PRICE INPUT
// ============================================================================

/// A price as callers supply it: a number or numeric text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceInput {
    Number(f64),
    Text(String),
}

impl std::fmt::Display for PriceInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceInput::Number(n) => write!(f, "{}", n),
            PriceInput::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for PriceInput {
    fn from(value: f64) -> Self {
        PriceInput::Number(value)
    }
}

impl From<i64> for PriceInput {
    fn from(value: i64) -> Self {
        PriceInput::Text(value.to_string())
    }
}

impl From<Decimal> for PriceInput {
    fn from(value: Decimal) -> Self {
        PriceInput::Text(value.to_string())
    }
}

impl From<&str> for PriceInput {
    fn from(value: &str) -> Self {
        PriceInput::Text(value.to_string())
    }
}

impl From<String> for PriceInput {
    fn from(value: String) -> Self {
        PriceInput::Text(value)
    }
}

// ============================================================================
// VALIDATORS
// ============================================================================

/// Parse and check a price. Zero is valid; negative, NaN and non-numeric are not.
pub fn validate_price(input: &PriceInput) -> Result<Decimal, ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidPrice {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let price = match input {
        PriceInput::Number(n) => {
            if !n.is_finite() {
                return Err(invalid("not a finite number"));
            }
            Decimal::from_f64(*n).ok_or_else(|| invalid("out of range"))?
        }
        PriceInput::Text(s) => {
            let trimmed = s.trim();
            Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .map_err(|_| invalid("not a number"))?
        }
    };

    if price.is_sign_negative() && !price.is_zero() {
        return Err(invalid("Price cannot be negative"));
    }

    Ok(price.normalize())
}

/// Trim and require a non-empty external identifier
pub fn validate_external_id(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::InvalidIdentifier);
    }
    Ok(trimmed.to_string())
}

// ============================================================================
// TESTS
// ============================================================================
