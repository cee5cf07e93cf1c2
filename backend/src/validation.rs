//! Request validation for the Tally API
//!
//! Field names in messages are the names the client sent (`companyId`,
//! `amount`, ...) so the 400 body reads `"<field> is required"`.

use rust_decimal::Decimal;
use crate::error::{ApiError, ApiResult, ValidationBuilder};

/// Identifier validation
pub mod id {
    use super::*;

    /// Positive integer id that must be present
    pub fn required(value: Option<i32>, field: &str) -> ApiResult<i32> {
        match value {
            Some(id) if id > 0 => Ok(id),
            Some(_) => Err(ApiError::validation_single(field, format!("{} must be a positive id", field))),
            None => Err(ApiError::required(field)),
        }
    }
}

/// Money validation
pub mod money {
    use super::*;

    /// Tolerance when comparing a line's stated total with quantity * unit price
    pub const CENT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

    pub fn positive(value: Option<Decimal>, field: &str) -> ApiResult<Decimal> {
        match value {
            Some(v) if v > Decimal::ZERO => Ok(v.round_dp(2)),
            Some(_) => Err(ApiError::validation_single(field, format!("{} must be greater than zero", field))),
            None => Err(ApiError::required(field)),
        }
    }

    pub fn line_total_matches(quantity: Decimal, unit_price: Decimal, total: Decimal) -> bool {
        ((quantity * unit_price).round_dp(2) - total).abs() <= CENT
    }
}

/// Builder for request-level validation with several fields
pub struct Validator {
    builder: ValidationBuilder,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            builder: ValidationBuilder::new(),
        }
    }

    pub fn error(mut self, field: &str, message: &str) -> Self {
        self.builder.push(field, message);
        self
    }

    pub fn error_if(self, condition: bool, field: &str, message: &str) -> Self {
        if condition {
            self.error(field, message)
        } else {
            self
        }
    }

    pub fn required_id(self, value: Option<i32>, field: &str) -> Self {
        match value {
            Some(id) if id > 0 => self,
            Some(_) => self.error(field, &format!("{} must be a positive id", field)),
            None => self.error(field, &format!("{} is required", field)),
        }
    }

    pub fn positive_amount(self, value: Option<Decimal>, field: &str) -> Self {
        match value {
            Some(v) if v > Decimal::ZERO => self,
            Some(_) => self.error(field, &format!("{} must be greater than zero", field)),
            None => self.error(field, &format!("{} is required", field)),
        }
    }

    pub fn non_negative(self, value: Decimal, field: &str) -> Self {
        self.error_if(value < Decimal::ZERO, field, &format!("{} cannot be negative", field))
    }

    pub fn max_length(self, value: &Option<String>, field: &str, max: usize) -> Self {
        match value {
            Some(s) if s.len() > max => {
                self.error(field, &format!("{} must be {} characters or less", field, max))
            }
            _ => self,
        }
    }

    /// Fails when `value` is present and does not match `pattern`
    pub fn matches(self, value: &str, field: &str, pattern: &str) -> Self {
        if value.is_empty() {
            return self;
        }
        match regex::Regex::new(pattern) {
            Ok(re) if re.is_match(value) => self,
            _ => self.error(field, &format!("{} has an invalid format", field)),
        }
    }

    pub fn not_empty<T>(self, value: &[T], field: &str) -> Self {
        self.error_if(value.is_empty(), field, &format!("{} cannot be empty", field))
    }

    #[cfg(test)]
    pub fn is_valid(&self) -> bool {
        !self.builder.has_errors()
    }

    pub fn finish(self) -> ApiResult<()> {
        self.builder.finish()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Company codes: upper-case letters, digits, `-` and `_`
pub const COMPANY_CODE_PATTERN: &str = r"^[A-Z0-9][A-Z0-9_-]*$";
/// Chart-of-accounts codes such as `1100` or `1100-01`
pub const ACCOUNT_CODE_PATTERN: &str = r"^[0-9]+(-[0-9]+)*$";

/// Accepted payment methods for receipts and bill payments
pub const PAYMENT_METHODS: &[&str] = &["Bank Transfer", "Cash", "Check", "Credit Card", "Wire", "Intercompany"];

pub fn payment_method(value: Option<&str>) -> ApiResult<String> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(PAYMENT_METHODS[0].to_string()),
        Some(v) => PAYMENT_METHODS
            .iter()
            .find(|m| m.eq_ignore_ascii_case(v))
            .map(|m| m.to_string())
            .ok_or_else(|| {
                ApiError::validation_single(
                    "paymentMethod",
                    format!("paymentMethod must be one of: {}", PAYMENT_METHODS.join(", ")),
                )
            }),
    }
}
