//! Coinbase spot prices, one ticker per request.
//!
//! `GET {base}/v2/prices/BTC-USD/spot` returns
//! `{"data": {"amount": "50000.01", "base": "BTC", "currency": "USD"}}`.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use crate::config::ProviderConfig;
use crate::errors::{ErrorCode, ErrorWithCode, OracleError};
use crate::models::{PriceResponse, PriceResult, ProviderTicker};
use crate::provider::api::{rest_endpoint, ApiDataHandler, ApiPriceFetcher};

pub const NAME: &str = "coinbase";

#[derive(Debug, Deserialize)]
struct SpotResponse {
    data: SpotPrice,
}

#[derive(Debug, Deserialize)]
struct SpotPrice {
    amount: String,
    base: String,
    currency: String,
}

pub struct CoinbaseHandler {
    base_url: String,
}

impl CoinbaseHandler {
    pub fn new(config: &ProviderConfig) -> Result<Self, OracleError> {
        if config.name != NAME {
            return Err(OracleError::NameMismatch {
                expected: NAME.to_string(),
                got: config.name.clone(),
            });
        }
        config.validate()?;
        if !config.api.enabled || config.api.atomic || config.api.batch_size > 1 {
            return Err(OracleError::InvalidConfig {
                provider: config.name.clone(),
                message: "coinbase prices one ticker per request".to_string(),
            });
        }

        let base_url = rest_endpoint(&config.api)?
            .url
            .trim_end_matches('/')
            .to_string();

        Ok(Self { base_url })
    }
}

impl ApiDataHandler for CoinbaseHandler {
    fn create_url(&self, tickers: &[ProviderTicker]) -> Result<String, ErrorWithCode> {
        let [ticker] = tickers else {
            return Err(ErrorWithCode::new(
                ErrorCode::CreateUrl,
                format!("expected exactly one ticker, got {}", tickers.len()),
            ));
        };

        Ok(format!(
            "{}/v2/prices/{}/spot",
            self.base_url,
            urlencoding::encode(&ticker.off_chain_ticker)
        ))
    }

    fn parse_response(&self, tickers: &[ProviderTicker], body: &str) -> PriceResponse {
        let [ticker] = tickers else {
            return PriceResponse::all_unresolved(
                tickers,
                ErrorWithCode::new(ErrorCode::InvalidResponse, "expected exactly one ticker"),
            );
        };

        let spot: SpotResponse = match serde_json::from_str(body) {
            Ok(spot) => spot,
            Err(e) => {
                warn!("Coinbase: failed to parse response for {}: {}", ticker, e);
                return PriceResponse::all_unresolved(
                    tickers,
                    ErrorWithCode::new(ErrorCode::ParseResponse, e),
                );
            }
        };

        let quoted = format!("{}-{}", spot.data.base, spot.data.currency);
        if !quoted.eq_ignore_ascii_case(&ticker.off_chain_ticker) {
            return PriceResponse::all_unresolved(
                tickers,
                ErrorWithCode::new(
                    ErrorCode::InvalidResponse,
                    format!("requested {}, response quotes {}", ticker, quoted),
                ),
            );
        }

        match Decimal::from_str(&spot.data.amount) {
            Ok(value) => {
                let mut response = PriceResponse::new();
                response.insert_resolved(ticker.clone(), PriceResult::now(value));
                response
            }
            Err(e) => PriceResponse::all_unresolved(
                tickers,
                ErrorWithCode::new(
                    ErrorCode::FailedToParsePrice,
                    format!("invalid amount '{}' for {}: {}", spot.data.amount, ticker, e),
                ),
            ),
        }
    }
}

/// Fetcher for a Coinbase provider config.
pub fn fetcher(config: &ProviderConfig) -> Result<ApiPriceFetcher<CoinbaseHandler>, OracleError> {
    ApiPriceFetcher::new(config, CoinbaseHandler::new(config)?)
}
