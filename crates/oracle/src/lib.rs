//! Pricefeed Oracle Crate
//!
//! Pulls raw market prices from heterogeneous venues (exchange HTTP APIs,
//! on-chain contracts over JSON-RPC), isolates failures per ticker, and
//! derives prices for pairs no venue quotes directly by walking configured
//! conversion paths.
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |  OracleConfig    |  (providers, markets, conversion paths)
//! +------------------+
//!          |  validate_paths at load
//!          v
//! +---------------------+     +------------------+
//! | ProviderQueryEngine | --> |  PriceFetcher    |  (Binance, Coinbase, EVM feed)
//! +---------------------+     +------------------+
//!          |                           |
//!          |                           v
//!          |                  +-----------------------+
//!          |                  | MultiEndpointTransport|  (query all, keep freshest)
//!          |                  +-----------------------+
//!          v
//! +------------------+
//! |  PriceResponse   |  (resolved / unresolved per ticker)
//! +------------------+
//!          |  leg_prices + resolve
//!          v
//! +------------------+
//! |  PriceResult     |  (derived price for the target pair)
//! +------------------+
//! ```
//!
//! # Core Types
//!
//! - [`CurrencyPair`] - Canonical base/quote pair
//! - [`ProviderTicker`] - Venue-specific request handle
//! - [`ConversionPath`] - Chain of legs from a target's base to its quote
//! - [`PriceResponse`] - Per-cycle resolved and unresolved tickers
//! - [`ErrorWithCode`] - Classified per-ticker failure

pub mod cache;
pub mod config;
pub mod conversion;
pub mod engine;
pub mod errors;
pub mod instrumentation;
pub mod models;
pub mod provider;
pub mod transport;

// Re-export all public types from models
pub use models::{
    ConversionLeg, ConversionPath, CurrencyPair, PriceResponse, PriceResult, ProviderTicker,
    TickerPairs,
};

// Re-export error types
pub use errors::{ErrorCode, ErrorWithCode, OracleError, TransportError};

pub use cache::MetadataCache;
pub use config::{
    ApiConfig, Authentication, Endpoint, MarketConfig, MarketTicker, OracleConfig, ProviderConfig,
    WebSocketConfig,
};
pub use conversion::{leg_prices, resolve, validate_paths, LegPrices, MIN_PATH_LEGS};
pub use engine::{
    PriceFetcher, PriceProvider, PriceValidator, ProviderQueryEngine, ValidationSeverity,
    ValidatorConfig,
};
pub use instrumentation::{LogObserver, NoopObserver, Observer, Outcome};
pub use transport::{
    build_rpc_transport, BlockNumberProbe, FreshnessProbe, JsonRpcHttpTransport,
    MultiEndpointTransport, RpcError, RpcReply, RpcRequest, SlotProbe, Transport,
};
