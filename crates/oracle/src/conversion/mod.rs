//! Conversion paths for pairs no venue quotes directly.
//!
//! - [`validate_paths`] proves a configured chain telescopes from the target's
//!   base currency to its quote currency. Runs once at config load.
//! - [`resolve`] walks a validated chain over one cycle's leg prices.

mod resolver;
mod validator;

pub use resolver::{leg_prices, resolve, LegPrices};
pub use validator::{validate_paths, MIN_PATH_LEGS};
