//! Currency conversion seam used while committing monetary values.
//!
//! A missing rate is never fatal: the committer records the original amount,
//! leaves the USD column empty, and counts the omission in the summary.

use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

pub const USD: &str = "USD";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no USD rate for {currency} on {as_of}")]
pub struct RateUnavailable {
    pub currency: String,
    pub as_of: NaiveDate,
}

/// Looks up the USD value of an amount on a given date.
pub trait RateProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns `RateUnavailable` if no rate is known for the pair and date.
    fn usd_value(
        &self,
        amount: Decimal,
        currency: &str,
        as_of: NaiveDate,
    ) -> Result<Decimal, RateUnavailable>;
}

/// Convert with USD passing through unchanged.
///
/// # Errors
///
/// Propagates `RateUnavailable` from the provider.
pub fn to_usd(
    provider: &dyn RateProvider,
    amount: Decimal,
    currency: &str,
    as_of: NaiveDate,
) -> Result<Decimal, RateUnavailable> {
    if currency.eq_ignore_ascii_case(USD) {
        return Ok(amount);
    }
    provider.usd_value(amount, currency, as_of)
}

/// Provider with no rates at all. Only USD converts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRates;

impl RateProvider for NoRates {
    fn usd_value(
        &self,
        _amount: Decimal,
        currency: &str,
        as_of: NaiveDate,
    ) -> Result<Decimal, RateUnavailable> {
        Err(RateUnavailable {
            currency: currency.to_string(),
            as_of,
        })
    }
}

/// Date-independent rates: USD per one unit of each currency.
#[derive(Debug, Clone, Default)]
pub struct FixedRates {
    per_unit: HashMap<String, Decimal>,
}

impl FixedRates {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, currency: &str, usd_per_unit: Decimal) -> Self {
        self.per_unit.insert(currency.to_ascii_uppercase(), usd_per_unit);
        self
    }
}

impl RateProvider for FixedRates {
    fn usd_value(
        &self,
        amount: Decimal,
        currency: &str,
        as_of: NaiveDate,
    ) -> Result<Decimal, RateUnavailable> {
        self.per_unit
            .get(&currency.to_ascii_uppercase())
            .map(|rate| (amount * *rate).round_dp(2))
            .ok_or_else(|| RateUnavailable {
                currency: currency.to_string(),
                as_of,
            })
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn usd_passes_through_without_a_rate() {
        let amount = Decimal::from_str("1250.50").unwrap();
        assert_eq!(to_usd(&NoRates, amount, "usd", date()), Ok(amount));
    }

    #[test]
    fn missing_rate_is_reported() {
        let err = to_usd(&NoRates, Decimal::ONE, "KRW", date()).unwrap_err();
        assert_eq!(err.currency, "KRW");
    }

    #[test]
    fn fixed_rates_multiply_and_round() {
        let rates = FixedRates::new().with("eur", Decimal::from_str("1.0825").unwrap());
        let usd = to_usd(&rates, Decimal::from(1000), "EUR", date()).unwrap();
        assert_eq!(usd, Decimal::from_str("1082.50").unwrap());
    }
}
