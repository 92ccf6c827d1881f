//! Binance spot ticker prices.
//!
//! One request prices every ticker:
//! `GET {base}/api/v3/ticker/price?symbols=["BTCUSDT","ETHUSDT"]`
//!
//! API documentation: https://developers.binance.com/docs/binance-spot-api-docs/rest-api

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::errors::{ErrorCode, ErrorWithCode, OracleError};
use crate::models::{PriceResponse, PriceResult, ProviderTicker};
use crate::provider::api::{rest_endpoint, ApiDataHandler, ApiPriceFetcher};

pub const NAME: &str = "binance";

// ============================================================================
// API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

// ============================================================================
// Handler
// ============================================================================

pub struct BinanceHandler {
    base_url: String,
}

impl BinanceHandler {
    pub fn new(config: &ProviderConfig) -> Result<Self, OracleError> {
        if config.name != NAME {
            return Err(OracleError::NameMismatch {
                expected: NAME.to_string(),
                got: config.name.clone(),
            });
        }
        config.validate()?;
        if !config.api.enabled || !config.api.atomic {
            return Err(OracleError::InvalidConfig {
                provider: config.name.clone(),
                message: "binance requires an enabled, atomic api config".to_string(),
            });
        }

        let base_url = rest_endpoint(&config.api)?
            .url
            .trim_end_matches('/')
            .to_string();

        Ok(Self { base_url })
    }
}

impl ApiDataHandler for BinanceHandler {
    fn create_url(&self, tickers: &[ProviderTicker]) -> Result<String, ErrorWithCode> {
        if tickers.is_empty() {
            return Err(ErrorWithCode::new(ErrorCode::CreateUrl, "no tickers to request"));
        }

        let symbols = tickers
            .iter()
            .map(|t| format!("\"{}\"", t.off_chain_ticker))
            .collect::<Vec<_>>()
            .join(",");

        Ok(format!(
            "{}/api/v3/ticker/price?symbols={}",
            self.base_url,
            urlencoding::encode(&format!("[{}]", symbols))
        ))
    }

    fn parse_response(&self, tickers: &[ProviderTicker], body: &str) -> PriceResponse {
        let prices: Vec<TickerPrice> = match serde_json::from_str(body) {
            Ok(prices) => prices,
            Err(e) => {
                warn!("Binance: failed to parse response: {}", e);
                return PriceResponse::all_unresolved(
                    tickers,
                    ErrorWithCode::new(ErrorCode::ParseResponse, e),
                );
            }
        };

        let by_symbol: HashMap<&str, &str> = prices
            .iter()
            .map(|p| (p.symbol.as_str(), p.price.as_str()))
            .collect();

        let mut response = PriceResponse::new();
        for ticker in tickers {
            let Some(price) = by_symbol.get(ticker.off_chain_ticker.as_str()) else {
                response.insert_unresolved(
                    ticker.clone(),
                    ErrorWithCode::new(
                        ErrorCode::InvalidResponse,
                        format!("no price for {} in response", ticker),
                    ),
                );
                continue;
            };

            match Decimal::from_str(price) {
                Ok(value) => {
                    debug!("Binance: {} = {}", ticker, value);
                    response.insert_resolved(ticker.clone(), PriceResult::now(value));
                }
                Err(e) => response.insert_unresolved(
                    ticker.clone(),
                    ErrorWithCode::new(
                        ErrorCode::FailedToParsePrice,
                        format!("invalid price '{}' for {}: {}", price, ticker, e),
                    ),
                ),
            }
        }
        response
    }
}

/// Fetcher for a Binance provider config.
pub fn fetcher(config: &ProviderConfig) -> Result<ApiPriceFetcher<BinanceHandler>, OracleError> {
    ApiPriceFetcher::new(config, BinanceHandler::new(config)?)
}
