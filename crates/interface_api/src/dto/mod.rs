//! Request and response bodies
//!
//! Requests are deserialized and checked with `validator` before they reach
//! a tracker; the domain still enforces every business rule. Money leaves
//! the API as decimal strings next to a document-level currency code.

pub mod sales;
pub mod purchase;
pub mod ledger;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use core_kernel::{Currency, MAX_AMOUNT};
use domain_ledger::LedgerOutcome;

use crate::error::ApiError;

/// JSON body that has passed its `Validate` rules
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        value.validate().map_err(|e| ApiError::Validation(e.to_string()))?;
        Ok(ValidatedJson(value))
    }
}

/// A committed document with the state of its ledger posting
#[derive(Debug, Serialize)]
pub struct WithLedger<T> {
    #[serde(flatten)]
    pub document: T,
    pub ledger: LedgerOutcome,
}

/// Optional `?reason=` on withdrawals
#[derive(Debug, Deserialize)]
pub struct ReasonQuery {
    pub reason: Option<String>,
}

impl ReasonQuery {
    pub fn reason_or(&self, default: &str) -> String {
        match self.reason.as_deref().map(str::trim) {
            Some(reason) if !reason.is_empty() => reason.to_string(),
            _ => default.to_string(),
        }
    }
}

pub(crate) fn positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("must_be_positive"));
    }
    within_ceiling(value)
}

pub(crate) fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("must_not_be_negative"));
    }
    within_ceiling(value)
}

fn within_ceiling(value: &Decimal) -> Result<(), ValidationError> {
    if *value > MAX_AMOUNT {
        return Err(ValidationError::new("too_large"));
    }
    Ok(())
}

/// Parses an optional ISO code, falling back to the ledger currency
pub(crate) fn currency_or(code: Option<&str>, default: Currency) -> Result<Currency, ApiError> {
    match code {
        Some(code) => Ok(code.parse()?),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_rules() {
        assert!(positive(&dec!(0.01)).is_ok());
        assert!(positive(&dec!(0)).is_err());
        assert!(non_negative(&dec!(0)).is_ok());
        assert!(non_negative(&dec!(-1)).is_err());
        assert!(positive(&MAX_AMOUNT).is_ok());
        assert!(positive(&(MAX_AMOUNT + dec!(1))).is_err());
        assert!(non_negative(&(MAX_AMOUNT + dec!(1))).is_err());
    }

    #[test]
    fn test_currency_fallback() {
        assert_eq!(currency_or(None, Currency::EUR).unwrap(), Currency::EUR);
        assert_eq!(currency_or(Some("gbp"), Currency::EUR).unwrap(), Currency::GBP);
        assert!(matches!(currency_or(Some("???"), Currency::EUR), Err(ApiError::Validation(_))));
    }
}
