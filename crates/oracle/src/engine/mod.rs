//! Provider query engine and the fetch contracts it is built on.
//!
//! A [`PriceFetcher`] knows how to price one batch of tickers against one
//! venue. The [`ProviderQueryEngine`] turns a fetcher into a
//! [`PriceProvider`]: it splits the requested tickers into batches, bounds
//! the number of batches in flight, applies the cycle deadline and
//! cancellation, and assembles one [`PriceResponse`] in which every requested
//! ticker is either resolved or carries a classified error.

mod query_engine;
mod validator;

pub use query_engine::ProviderQueryEngine;
pub use validator::{PriceValidator, ValidationSeverity, ValidatorConfig};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::models::{PriceResponse, ProviderTicker};

/// Prices one batch of tickers.
///
/// Implementations report failures per ticker in the returned response and
/// should return promptly once `cancel` is triggered. Tickers left out of
/// the response are treated as unresolved by the engine.
#[async_trait]
pub trait PriceFetcher: Send + Sync {
    async fn fetch(&self, cancel: &CancellationToken, tickers: &[ProviderTicker])
        -> PriceResponse;
}

/// A named source of prices for a ticker set.
///
/// Every requested ticker appears in exactly one of the two maps of the
/// returned response.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, cancel: &CancellationToken, tickers: &[ProviderTicker])
        -> PriceResponse;
}
