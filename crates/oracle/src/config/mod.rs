//! Typed oracle configuration and its loader.
//!
//! Configuration is a JSON document with two sections:
//!
//! ```json
//! {
//!   "providers": [
//!     { "name": "binance", "api": { "enabled": true, "atomic": true,
//!       "endpoints": [{ "url": "https://api.binance.com" }] } }
//!   ],
//!   "markets": [
//!     { "target": "BTC/USDT",
//!       "tickers": [{ "provider": "binance", "off_chain_ticker": "BTCUSDT" }] }
//!   ]
//! }
//! ```
//!
//! Every recognized field is enumerated on the structs below; unknown fields
//! are rejected and omitted fields take explicit defaults. The loaded config
//! is validated as a whole and is immutable afterwards.

mod market;
mod provider;

pub use market::{MarketConfig, MarketTicker};
pub use provider::{ApiConfig, Authentication, Endpoint, ProviderConfig, WebSocketConfig};

use std::collections::{HashMap, HashSet};
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::errors::OracleError;
use crate::models::{CurrencyPair, ProviderTicker, TickerPairs};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "PRICEFEED_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "./config/oracle.json";

/// The full provider and market set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OracleConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    #[serde(default)]
    pub markets: Vec<MarketConfig>,
}

impl OracleConfig {
    /// Parse, apply defaults, and validate.
    pub fn from_json_str(text: &str) -> Result<Self, OracleError> {
        let mut config: OracleConfig = serde_json::from_str(text)?;
        for provider in &mut config.providers {
            provider.apply_defaults();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, OracleError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        info!(
            "Loaded {} provider(s) and {} market(s) from {}",
            config.providers.len(),
            config.markets.len(),
            path.display()
        );
        Ok(config)
    }

    /// Load from the file named by `PRICEFEED_CONFIG`, or the default path.
    pub fn from_env() -> Result<Self, OracleError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    pub fn validate(&self) -> Result<(), OracleError> {
        let mut names = HashSet::new();
        for provider in &self.providers {
            provider.validate()?;
            if !names.insert(provider.name.as_str()) {
                return Err(OracleError::InvalidConfig {
                    provider: provider.name.clone(),
                    message: "duplicate provider name".to_string(),
                });
            }
        }

        let mut targets = HashSet::new();
        // A venue symbol prices exactly one market, whatever its metadata.
        let mut symbols: HashMap<(&str, &str), &CurrencyPair> = HashMap::new();
        for market in &self.markets {
            market.validate()?;
            if !targets.insert(&market.target) {
                return Err(OracleError::InvalidMarket {
                    market: market.target.to_string(),
                    message: "duplicate market".to_string(),
                });
            }
            for ticker in &market.tickers {
                if !names.contains(ticker.provider.as_str()) {
                    return Err(OracleError::InvalidMarket {
                        market: market.target.to_string(),
                        message: format!("unknown provider '{}'", ticker.provider),
                    });
                }
                let key = (ticker.provider.as_str(), ticker.off_chain_ticker.as_str());
                if let Some(owner) = symbols.insert(key, &market.target) {
                    return Err(OracleError::InvalidMarket {
                        market: market.target.to_string(),
                        message: format!(
                            "{} ticker '{}' already prices {}",
                            ticker.provider, ticker.off_chain_ticker, owner
                        ),
                    });
                }
            }
        }

        // Conversion legs are priced by other markets.
        for market in &self.markets {
            for leg in market.conversion_paths.iter().flat_map(|path| path.pairs()) {
                if !targets.contains(leg) {
                    return Err(OracleError::InvalidMarket {
                        market: market.target.to_string(),
                        message: format!("conversion leg {} is not a configured market", leg),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    pub fn market(&self, target: &CurrencyPair) -> Option<&MarketConfig> {
        self.markets.iter().find(|m| &m.target == target)
    }

    /// Tickers the named provider must fetch.
    pub fn tickers(&self, provider: &str) -> Vec<ProviderTicker> {
        self.ticker_pairs(provider).into_keys().collect()
    }

    /// Ticker to pair mapping for the named provider.
    pub fn ticker_pairs(&self, provider: &str) -> TickerPairs {
        self.markets
            .iter()
            .flat_map(|market| {
                market
                    .tickers
                    .iter()
                    .filter(|t| t.provider == provider)
                    .map(|t| (t.ticker(), market.target.clone()))
            })
            .collect()
    }
}
