use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::OracleError;

/// Canonical base/quote symbol pair.
///
/// A price for the pair is "how many quote units per one base unit".
/// Symbols are trimmed and upper-cased on construction, so `btc/usd` and
/// `BTC/USD` compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "PairRepr", into = "String")]
pub struct CurrencyPair {
    base: String,
    quote: String,
}

impl CurrencyPair {
    pub fn new(base: impl AsRef<str>, quote: impl AsRef<str>) -> Self {
        Self {
            base: normalize(base.as_ref()),
            quote: normalize(quote.as_ref()),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    /// The same market seen from the other side.
    pub fn inverted(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }

    /// Basic symbol validation: both sides present and free of separators.
    pub fn validate(&self) -> Result<(), OracleError> {
        if self.base.is_empty() || self.quote.is_empty() {
            return Err(OracleError::InvalidCurrencyPair(format!(
                "empty symbol in '{}'",
                self
            )));
        }
        if self.base.contains('/') || self.quote.contains('/') {
            return Err(OracleError::InvalidCurrencyPair(format!(
                "symbol contains '/' in '{}/{}'",
                self.base, self.quote
            )));
        }
        Ok(())
    }
}

fn normalize(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for CurrencyPair {
    type Err = OracleError;

    /// Parse the `BASE/QUOTE` form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once('/')
            .ok_or_else(|| OracleError::InvalidCurrencyPair(format!("missing '/' in '{}'", s)))?;
        let pair = Self::new(base, quote);
        pair.validate()?;
        Ok(pair)
    }
}

impl From<CurrencyPair> for String {
    fn from(pair: CurrencyPair) -> Self {
        pair.to_string()
    }
}

/// Accepted serialized forms: `"BTC/USD"` or `{"base": "BTC", "quote": "USD"}`.
///
/// A string without a separator becomes a pair with an empty quote so that
/// config validation reports it with the rest of the config errors.
#[derive(Deserialize)]
#[serde(untagged)]
enum PairRepr {
    Text(String),
    Fields { base: String, quote: String },
}

impl From<PairRepr> for CurrencyPair {
    fn from(repr: PairRepr) -> Self {
        match repr {
            PairRepr::Text(text) => match text.split_once('/') {
                Some((base, quote)) => CurrencyPair::new(base, quote),
                None => CurrencyPair::new(text, ""),
            },
            PairRepr::Fields { base, quote } => CurrencyPair::new(base, quote),
        }
    }
}
