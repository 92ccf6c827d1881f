use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Venue-specific request handle for a price.
///
/// `off_chain_ticker` is the symbol the venue understands (`BTCUSDT`,
/// `BTC-USD`, a pool name, ...). `json` is opaque venue metadata (pool ids,
/// contract addresses, decimals) parsed lazily by the venue glue.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderTicker {
    pub off_chain_ticker: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub json: String,
}

impl ProviderTicker {
    pub fn new(off_chain_ticker: impl Into<String>, json: impl Into<String>) -> Self {
        Self {
            off_chain_ticker: off_chain_ticker.into(),
            json: json.into(),
        }
    }

    /// Ticker without metadata.
    pub fn symbol(off_chain_ticker: impl Into<String>) -> Self {
        Self::new(off_chain_ticker, String::new())
    }

    pub fn has_metadata(&self) -> bool {
        !self.json.trim().is_empty()
    }

    /// Parse the metadata blob into a venue type.
    pub fn metadata<M: DeserializeOwned>(&self) -> Result<M, serde_json::Error> {
        serde_json::from_str(&self.json)
    }
}

impl fmt::Display for ProviderTicker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.off_chain_ticker)
    }
}
