use std::collections::HashMap;

use super::currency_pair::CurrencyPair;
use super::ticker::ProviderTicker;

/// Mapping from a provider's tickers to the canonical pairs they price
pub type TickerPairs = HashMap<ProviderTicker, CurrencyPair>;
