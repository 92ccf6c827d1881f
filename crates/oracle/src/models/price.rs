use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ticker::ProviderTicker;
use crate::errors::ErrorWithCode;

/// A resolved price observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceResult {
    /// Quote units per base unit
    pub value: Decimal,

    /// When the price was observed
    pub observed_at: DateTime<Utc>,
}

impl PriceResult {
    pub fn new(value: Decimal, observed_at: DateTime<Utc>) -> Self {
        Self { value, observed_at }
    }

    /// Price observed now
    pub fn now(value: Decimal) -> Self {
        Self::new(value, Utc::now())
    }
}

/// Outcome of one fetch cycle for a requested ticker set.
///
/// Every requested ticker ends up in exactly one of the two maps. Inserting
/// a ticker into one map removes it from the other.
#[derive(Clone, Debug, Default)]
pub struct PriceResponse {
    pub resolved: HashMap<ProviderTicker, PriceResult>,
    pub unresolved: HashMap<ProviderTicker, ErrorWithCode>,
}

impl PriceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response marking every ticker unresolved with the same error.
    pub fn all_unresolved<'a, I>(tickers: I, error: ErrorWithCode) -> Self
    where
        I: IntoIterator<Item = &'a ProviderTicker>,
    {
        let mut response = Self::new();
        for ticker in tickers {
            response.insert_unresolved(ticker.clone(), error.clone());
        }
        response
    }

    pub fn insert_resolved(&mut self, ticker: ProviderTicker, price: PriceResult) {
        self.unresolved.remove(&ticker);
        self.resolved.insert(ticker, price);
    }

    pub fn insert_unresolved(&mut self, ticker: ProviderTicker, error: ErrorWithCode) {
        self.resolved.remove(&ticker);
        self.unresolved.insert(ticker, error);
    }

    /// Fold another response into this one. Entries from `other` win.
    pub fn merge(&mut self, other: PriceResponse) {
        for (ticker, price) in other.resolved {
            self.insert_resolved(ticker, price);
        }
        for (ticker, error) in other.unresolved {
            self.insert_unresolved(ticker, error);
        }
    }

    pub fn price(&self, ticker: &ProviderTicker) -> Option<&PriceResult> {
        self.resolved.get(ticker)
    }

    pub fn error(&self, ticker: &ProviderTicker) -> Option<&ErrorWithCode> {
        self.unresolved.get(ticker)
    }

    /// Number of tickers in either map
    pub fn len(&self) -> usize {
        self.resolved.len() + self.unresolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.unresolved.is_empty()
    }
}
