//! Oracle data models
//!
//! This module contains the value types shared by every component:
//! - `currency_pair` - Canonical base/quote pair (CurrencyPair)
//! - `ticker` - Venue-specific request handle (ProviderTicker)
//! - `conversion` - Conversion chains (ConversionLeg, ConversionPath)
//! - `price` - Fetch cycle results (PriceResult, PriceResponse)
//! - `types` - Type aliases for common identifiers

mod conversion;
mod currency_pair;
mod price;
mod ticker;
mod types;

pub use conversion::{ConversionLeg, ConversionPath};
pub use currency_pair::CurrencyPair;
pub use price::{PriceResponse, PriceResult};
pub use ticker::ProviderTicker;
pub use types::TickerPairs;
