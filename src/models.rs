// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Schema Choice Sets and Field Rules
//!
//! Enumerated values shared by the invoicing tables, plus the field-level
//! validation every repository runs before a row is written.
//!
//! ## Choice Sets
//!
//! | Type | Stored as | Values |
//! |------|-----------|--------|
//! | [`Currency`] | lowercase code | `eur`, `usd`, `ron` |
//! | [`InvoicingUnit`] | two-letter code | `mo`, `hr` |
//! | [`InvoiceStatus`] | integer | `0` draft, `1` published, `2` storno |
//!
//! Anything outside these sets is rejected both when parsed from text and
//! when a stored row is decoded.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Maximum length of names, descriptions and bank names.
pub const LONG_TEXT: usize = 255;
/// Maximum length of identifiers such as fiscal codes and bank accounts.
pub const SHORT_TEXT: usize = 40;
/// Maximum length of invoice series codes.
pub const REALLY_SHORT: usize = 16;
/// Maximum length of the stored datastore checksum (`0xffffffff`).
pub const CRC_TEXT: usize = 10;

/// Total digits allowed in monetary and rate columns.
pub const DECIMAL_MAX_DIGITS: u32 = 16;
/// Decimal places of unit rates.
pub const RATE_PLACES: u32 = 2;
/// Decimal places of currency conversion rates.
pub const CONVERSION_PLACES: u32 = 4;

// =============================================================================
// Validation Errors
// =============================================================================

/// A field value that the schema refuses to store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{value:?} is not a valid choice for {field}")]
    InvalidChoice { field: &'static str, value: String },

    #[error("{field} allows at most {max_digits} digits with {places} decimal places")]
    DecimalOutOfRange {
        field: &'static str,
        max_digits: u32,
        places: u32,
    },

    #[error("{field} must not be negative")]
    Negative { field: &'static str },

    #[error("{0:?} is not a valid email address")]
    InvalidEmail(String),

    #[error("{0}")]
    Invariant(String),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Require a non-blank value of at most `max` characters.
pub fn require_text(field: &'static str, value: &str, max: usize) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required { field });
    }
    limit_text(field, value, max)
}

/// Allow blank values but cap the length.
pub fn limit_text(field: &'static str, value: &str, max: usize) -> ValidationResult<()> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Check a decimal against a `max_digits`/`places` column definition.
pub fn check_decimal(
    field: &'static str,
    value: Decimal,
    max_digits: u32,
    places: u32,
) -> ValidationResult<()> {
    let out_of_range = ValidationError::DecimalOutOfRange {
        field,
        max_digits,
        places,
    };

    let normalized = value.normalize();
    if normalized.scale() > places {
        return Err(out_of_range);
    }

    let whole = normalized.abs().trunc();
    let whole_digits = if whole.is_zero() {
        0
    } else {
        whole.normalize().to_string().len() as u32
    };
    if whole_digits > max_digits - places {
        return Err(out_of_range);
    }
    Ok(())
}

/// Reject negative rates.
pub fn check_non_negative(field: &'static str, value: Decimal) -> ValidationResult<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::Negative { field });
    }
    Ok(())
}

// =============================================================================
// Currency
// =============================================================================

/// Currencies a contract or invoice can be denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Eur,
    Usd,
    Ron,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Eur, Currency::Usd, Currency::Ron];

    /// Stored code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Eur => "eur",
            Currency::Usd => "usd",
            Currency::Ron => "ron",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Currency::Eur => "Euros",
            Currency::Usd => "US Dollars",
            Currency::Ron => "Lei",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Currency::ALL
            .into_iter()
            .find(|c| c.code() == s)
            .ok_or_else(|| ValidationError::InvalidChoice {
                field: "currency",
                value: s.to_string(),
            })
    }
}

// =============================================================================
// Invoicing Unit
// =============================================================================

/// Billing period a unit rate applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvoicingUnit {
    #[serde(rename = "mo")]
    Monthly,
    #[serde(rename = "hr")]
    Hourly,
}

impl InvoicingUnit {
    pub const ALL: [InvoicingUnit; 2] = [InvoicingUnit::Monthly, InvoicingUnit::Hourly];

    pub fn code(&self) -> &'static str {
        match self {
            InvoicingUnit::Monthly => "mo",
            InvoicingUnit::Hourly => "hr",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InvoicingUnit::Monthly => "Month",
            InvoicingUnit::Hourly => "Hour",
        }
    }
}

impl fmt::Display for InvoicingUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for InvoicingUnit {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvoicingUnit::ALL
            .into_iter()
            .find(|u| u.code() == s)
            .ok_or_else(|| ValidationError::InvalidChoice {
                field: "unit",
                value: s.to_string(),
            })
    }
}

// =============================================================================
// Invoice Status
// =============================================================================

/// Lifecycle state of an issued invoice. Stored as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum InvoiceStatus {
    Draft,
    Published,
    Storno,
}

impl InvoiceStatus {
    pub fn label(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "Draft",
            InvoiceStatus::Published => "Published",
            InvoiceStatus::Storno => "Storno",
        }
    }
}

impl From<InvoiceStatus> for u8 {
    fn from(status: InvoiceStatus) -> Self {
        match status {
            InvoiceStatus::Draft => 0,
            InvoiceStatus::Published => 1,
            InvoiceStatus::Storno => 2,
        }
    }
}

impl TryFrom<u8> for InvoiceStatus {
    type Error = ValidationError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(InvoiceStatus::Draft),
            1 => Ok(InvoiceStatus::Published),
            2 => Ok(InvoiceStatus::Storno),
            other => Err(ValidationError::InvalidChoice {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_parses_known_codes_only() {
        assert_eq!("eur".parse::<Currency>(), Ok(Currency::Eur));
        assert_eq!("ron".parse::<Currency>(), Ok(Currency::Ron));
        assert!(matches!(
            "gbp".parse::<Currency>(),
            Err(ValidationError::InvalidChoice { field: "currency", .. })
        ));
        // Codes are case-sensitive, like the stored values.
        assert!("EUR".parse::<Currency>().is_err());
    }

    #[test]
    fn unit_rejects_unknown_codes() {
        assert_eq!("hr".parse::<InvoicingUnit>(), Ok(InvoicingUnit::Hourly));
        assert!("day".parse::<InvoicingUnit>().is_err());
    }

    #[test]
    fn choices_reject_unknown_values_when_decoding() {
        assert!(serde_json::from_str::<Currency>("\"chf\"").is_err());
        assert!(serde_json::from_str::<InvoicingUnit>("\"wk\"").is_err());
        assert!(serde_json::from_str::<InvoiceStatus>("3").is_err());
        assert_eq!(
            serde_json::from_str::<InvoiceStatus>("2").unwrap(),
            InvoiceStatus::Storno
        );
    }

    #[test]
    fn status_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&InvoiceStatus::Published).unwrap(), "1");
        assert_eq!(serde_json::to_string(&InvoicingUnit::Monthly).unwrap(), "\"mo\"");
        assert_eq!(serde_json::to_string(&Currency::Usd).unwrap(), "\"usd\"");
    }

    #[test]
    fn require_text_checks_blank_and_length() {
        assert!(require_text("name", "Acme", LONG_TEXT).is_ok());
        assert_eq!(
            require_text("name", "   ", LONG_TEXT),
            Err(ValidationError::Required { field: "name" })
        );
        let long = "x".repeat(REALLY_SHORT + 1);
        assert_eq!(
            require_text("invoice_series", &long, REALLY_SHORT),
            Err(ValidationError::TooLong {
                field: "invoice_series",
                max: REALLY_SHORT
            })
        );
    }

    #[test]
    fn decimal_column_limits() {
        assert!(check_decimal("unit_rate", Decimal::new(12345, 2), 16, 2).is_ok());
        // Trailing zeros do not count against the scale.
        assert!(check_decimal("unit_rate", Decimal::new(1_000, 3), 16, 2).is_ok());
        assert!(check_decimal("unit_rate", Decimal::new(12345, 3), 16, 2).is_err());
        // 15 whole digits do not fit beside 2 decimal places.
        assert!(check_decimal("unit_rate", Decimal::new(100_000_000_000_000, 0), 16, 2).is_err());
        assert!(check_decimal("unit_rate", Decimal::new(99_999_999_999_999, 1), 16, 2).is_ok());
        assert!(check_decimal("conversion_rate", Decimal::new(49_512, 4), 16, 4).is_ok());
    }

    #[test]
    fn negative_rates_rejected() {
        assert!(check_non_negative("unit_rate", Decimal::ZERO).is_ok());
        assert!(check_non_negative("unit_rate", Decimal::new(-0, 2)).is_ok());
        assert_eq!(
            check_non_negative("unit_rate", Decimal::new(-1, 2)),
            Err(ValidationError::Negative { field: "unit_rate" })
        );
    }
}
