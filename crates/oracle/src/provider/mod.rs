//! Venue glue.
//!
//! Each venue turns a batch of [`ProviderTicker`](crate::models::ProviderTicker)s
//! into a [`PriceResponse`](crate::models::PriceResponse) by implementing
//! [`PriceFetcher`](crate::engine::PriceFetcher), either directly or through
//! the generic [`ApiPriceFetcher`] for plain HTTP APIs.
//!
//! - `binance` - atomic: one request prices every ticker
//! - `coinbase` - one ticker per request
//! - `evm_feed` - on-chain aggregator contracts over JSON-RPC
//!
//! Venues only produce prices. Batching, concurrency, deadlines and
//! cancellation are the query engine's job.

pub mod api;
pub mod binance;
pub mod coinbase;
pub mod evm_feed;

pub use api::{rest_endpoint, ApiDataHandler, ApiPriceFetcher, RestRequestHandler};
pub use evm_feed::{EvmFeedFetcher, FeedMetadata};
