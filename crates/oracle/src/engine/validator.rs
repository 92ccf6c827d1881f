//! Price sanity validation.
//!
//! Runs over every resolved price of a fetch cycle:
//! - Non-negative values
//! - Optional upper bound as a sanity check
//! - Optional staleness bound on the observation time
//!
//! Hard failures move the ticker to the unresolved set with
//! [`ErrorCode::InvalidResponse`]. Soft issues are logged and the price is kept.

use chrono::{DateTime, Duration, Utc};
use log::warn;
use rust_decimal::Decimal;

use crate::errors::{ErrorCode, ErrorWithCode};
use crate::models::{PriceResponse, PriceResult, ProviderTicker};

/// Validation severity levels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationSeverity {
    /// Reject the price.
    Hard,
    /// Keep the price, log a warning.
    Soft,
}

#[derive(Clone, Debug)]
struct ValidationIssue {
    severity: ValidationSeverity,
    message: String,
}

/// Price validator configuration.
#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    pub reject_negative_prices: bool,

    /// Maximum allowed price value.
    pub max_price: Option<Decimal>,

    /// Maximum age of an observation relative to the cycle time.
    pub max_age: Option<Duration>,

    /// How far past the cycle time an observation may be stamped before it
    /// is reported as coming from the future.
    pub max_clock_skew: Duration,

    pub warn_on_zero_price: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            reject_negative_prices: true,
            max_price: None,
            max_age: None,
            max_clock_skew: Duration::seconds(60),
            warn_on_zero_price: true,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct PriceValidator {
    config: ValidatorConfig,
}

impl PriceValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate one price observed for `ticker` against the cycle time `now`.
    pub fn validate(
        &self,
        ticker: &ProviderTicker,
        price: &PriceResult,
        now: DateTime<Utc>,
    ) -> Result<(), ErrorWithCode> {
        let mut issues = Vec::new();

        self.validate_sign(price, &mut issues);
        self.validate_range(price, &mut issues);
        self.validate_age(price, now, &mut issues);

        let errors: Vec<_> = issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Hard)
            .map(|i| i.message.as_str())
            .collect();

        if !errors.is_empty() {
            return Err(ErrorWithCode::new(
                ErrorCode::InvalidResponse,
                format!("{}: {}", ticker, errors.join("; ")),
            ));
        }

        for issue in issues.iter().filter(|i| i.severity == ValidationSeverity::Soft) {
            warn!("Price validation warning for {}: {}", ticker, issue.message);
        }

        Ok(())
    }

    /// Validate every resolved price in place, moving rejected tickers to the
    /// unresolved set.
    pub fn apply(&self, response: &mut PriceResponse, now: DateTime<Utc>) {
        let rejected: Vec<_> = response
            .resolved
            .iter()
            .filter_map(|(ticker, price)| {
                self.validate(ticker, price, now)
                    .err()
                    .map(|error| (ticker.clone(), error))
            })
            .collect();

        for (ticker, error) in rejected {
            warn!("Rejected price for {}: {}", ticker, error);
            response.insert_unresolved(ticker, error);
        }
    }

    fn validate_sign(&self, price: &PriceResult, issues: &mut Vec<ValidationIssue>) {
        if self.config.reject_negative_prices && price.value < Decimal::ZERO {
            issues.push(ValidationIssue {
                severity: ValidationSeverity::Hard,
                message: format!("negative price {}", price.value),
            });
        }
        if self.config.warn_on_zero_price && price.value.is_zero() {
            issues.push(ValidationIssue {
                severity: ValidationSeverity::Soft,
                message: "zero price".to_string(),
            });
        }
    }

    fn validate_range(&self, price: &PriceResult, issues: &mut Vec<ValidationIssue>) {
        if let Some(max) = self.config.max_price {
            if price.value > max {
                issues.push(ValidationIssue {
                    severity: ValidationSeverity::Hard,
                    message: format!("price {} exceeds maximum {}", price.value, max),
                });
            }
        }
    }

    fn validate_age(
        &self,
        price: &PriceResult,
        now: DateTime<Utc>,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let age = now.signed_duration_since(price.observed_at);
        if let Some(max_age) = self.config.max_age {
            if age > max_age {
                issues.push(ValidationIssue {
                    severity: ValidationSeverity::Hard,
                    message: format!(
                        "price is {}s old, limit is {}s",
                        age.num_seconds(),
                        max_age.num_seconds()
                    ),
                });
            }
        }
        if age < -self.config.max_clock_skew {
            issues.push(ValidationIssue {
                severity: ValidationSeverity::Soft,
                message: format!("observation time {} is in the future", price.observed_at),
            });
        }
    }
}
