use serde::{Deserialize, Serialize};

use crate::conversion::validate_paths;
use crate::errors::OracleError;
use crate::models::{ConversionPath, CurrencyPair, ProviderTicker};

/// A provider ticker that prices a market directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarketTicker {
    pub provider: String,
    pub off_chain_ticker: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub json: String,
}

impl MarketTicker {
    pub fn ticker(&self) -> ProviderTicker {
        ProviderTicker::new(self.off_chain_ticker.clone(), self.json.clone())
    }
}

/// How one target pair is priced: directly by provider tickers, or by
/// walking conversion paths over other markets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarketConfig {
    pub target: CurrencyPair,

    #[serde(default)]
    pub tickers: Vec<MarketTicker>,

    #[serde(default)]
    pub conversion_paths: Vec<ConversionPath>,
}

impl MarketConfig {
    pub fn validate(&self) -> Result<(), OracleError> {
        self.target.validate()?;

        if self.tickers.is_empty() && self.conversion_paths.is_empty() {
            return Err(self.invalid("no tickers or conversion paths configured"));
        }

        for ticker in &self.tickers {
            if ticker.provider.trim().is_empty() {
                return Err(self.invalid("ticker without provider"));
            }
            if ticker.off_chain_ticker.trim().is_empty() {
                return Err(self.invalid(format!(
                    "empty off-chain ticker for provider '{}'",
                    ticker.provider
                )));
            }
        }

        validate_paths(&self.target, &self.conversion_paths)
    }

    fn invalid(&self, message: impl Into<String>) -> OracleError {
        OracleError::InvalidMarket {
            market: self.target.to_string(),
            message: message.into(),
        }
    }
}
