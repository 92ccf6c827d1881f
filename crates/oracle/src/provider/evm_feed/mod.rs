//! On-chain price feeds read through EVM JSON-RPC.
//!
//! Each ticker names an aggregator contract in its metadata:
//!
//! ```json
//! { "address": "0x5f4eC3Df9cbd43714FE2740f5E3616155c5b8419", "decimals": 8, "invert": false }
//! ```
//!
//! A fetch batches one `eth_call` of `latestAnswer()` per ticker into a
//! single transport call. The transport may be a single node or a
//! [`MultiEndpointTransport`](crate::transport::MultiEndpointTransport)
//! over redundant nodes; this module cannot tell the difference.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::MetadataCache;
use crate::config::ProviderConfig;
use crate::engine::PriceFetcher;
use crate::errors::{ErrorCode, ErrorWithCode, OracleError};
use crate::models::{PriceResponse, PriceResult, ProviderTicker};
use crate::transport::{build_rpc_transport, BlockNumberProbe, RpcReply, RpcRequest, Transport};

/// Selector of `latestAnswer()`.
const LATEST_ANSWER: &str = "0x50d25bcd";

/// Largest scale a `Decimal` supports.
const MAX_DECIMALS: u32 = 28;

// ============================================================================
// Ticker Metadata
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeedMetadata {
    /// Aggregator contract address.
    pub address: String,

    /// Decimal places of the raw answer.
    pub decimals: u32,

    /// Report the reciprocal of the feed answer.
    #[serde(default)]
    pub invert: bool,
}

impl FeedMetadata {
    fn parse(ticker: &ProviderTicker) -> Result<Self, ErrorWithCode> {
        if !ticker.has_metadata() {
            return Err(metadata_error(ticker, "metadata is missing"));
        }
        let metadata: FeedMetadata = ticker
            .metadata()
            .map_err(|e| metadata_error(ticker, &e.to_string()))?;
        metadata
            .validate()
            .map_err(|message| metadata_error(ticker, &message))?;
        Ok(metadata)
    }

    fn validate(&self) -> Result<(), String> {
        let hex = self
            .address
            .strip_prefix("0x")
            .ok_or_else(|| format!("address '{}' must start with 0x", self.address))?;
        if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("address '{}' is not 20 hex bytes", self.address));
        }
        if self.decimals > MAX_DECIMALS {
            return Err(format!(
                "decimals {} exceeds the maximum of {}",
                self.decimals, MAX_DECIMALS
            ));
        }
        Ok(())
    }
}

fn metadata_error(ticker: &ProviderTicker, message: &str) -> ErrorWithCode {
    ErrorWithCode::new(
        ErrorCode::TickerMetadataNotFound,
        format!("invalid metadata for {}: {}", ticker, message),
    )
}

// ============================================================================
// Fetcher
// ============================================================================

pub struct EvmFeedFetcher {
    name: String,
    transport: Arc<dyn Transport>,
    metadata: MetadataCache<FeedMetadata>,
}

impl EvmFeedFetcher {
    pub fn new(name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            transport,
            metadata: MetadataCache::new(),
        }
    }

    /// Build the fetcher and its transport from a provider config. Several
    /// endpoints are treated as redundant nodes of the same chain.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, OracleError> {
        let transport = build_rpc_transport(config, Arc::new(BlockNumberProbe))?;
        Ok(Self::new(config.name.clone(), transport))
    }

    fn feed(&self, ticker: &ProviderTicker) -> Result<Arc<FeedMetadata>, ErrorWithCode> {
        self.metadata
            .get_or_try_insert_with(ticker, || FeedMetadata::parse(ticker))
    }
}

#[async_trait]
impl PriceFetcher for EvmFeedFetcher {
    async fn fetch(&self, cancel: &CancellationToken, tickers: &[ProviderTicker]) -> PriceResponse {
        let mut response = PriceResponse::new();

        let mut feeds = Vec::with_capacity(tickers.len());
        for ticker in tickers {
            match self.feed(ticker) {
                Ok(feed) => feeds.push((ticker, feed)),
                Err(error) => {
                    warn!("{}: {}", self.name, error);
                    response.insert_unresolved(ticker.clone(), error);
                }
            }
        }
        if feeds.is_empty() {
            return response;
        }

        let requests: Vec<RpcRequest> = feeds
            .iter()
            .map(|(_, feed)| {
                RpcRequest::new(
                    "eth_call",
                    json!([{"to": feed.address, "data": LATEST_ANSWER}, "latest"]),
                )
            })
            .collect();

        let replies = match self.transport.call(cancel, &requests).await {
            Ok(replies) if replies.len() == feeds.len() => replies,
            Ok(replies) => {
                let error = ErrorWithCode::new(
                    ErrorCode::InvalidResponse,
                    format!("expected {} replies, got {}", feeds.len(), replies.len()),
                );
                for (ticker, _) in feeds {
                    response.insert_unresolved(ticker.clone(), error.clone());
                }
                return response;
            }
            Err(e) => {
                warn!("{}: eth_call batch via {} failed: {}", self.name, self.transport.name(), e);
                let error = ErrorWithCode::from(e);
                for (ticker, _) in feeds {
                    response.insert_unresolved(ticker.clone(), error.clone());
                }
                return response;
            }
        };

        for ((ticker, feed), reply) in feeds.into_iter().zip(replies) {
            match price_from_reply(reply, &feed) {
                Ok(value) => {
                    debug!("{}: {} = {}", self.name, ticker, value);
                    response.insert_resolved(ticker.clone(), PriceResult::now(value));
                }
                Err(error) => response.insert_unresolved(ticker.clone(), error),
            }
        }
        response
    }
}

// ============================================================================
// Decoding
// ============================================================================

fn price_from_reply(reply: RpcReply, feed: &FeedMetadata) -> Result<Decimal, ErrorWithCode> {
    let value = reply.map_err(|e| ErrorWithCode::new(ErrorCode::ApiGeneral, e))?;
    let answer = decode_int256(&value)?;

    if answer < 0 {
        return Err(ErrorWithCode::new(
            ErrorCode::InvalidResponse,
            format!("feed {} answered a negative price", feed.address),
        ));
    }

    let price = Decimal::try_from_i128_with_scale(answer, feed.decimals).map_err(|e| {
        ErrorWithCode::new(
            ErrorCode::FailedToDecode,
            format!("answer {} out of range: {}", answer, e),
        )
    })?;

    if !feed.invert {
        return Ok(price);
    }
    if price.is_zero() {
        return Err(ErrorWithCode::new(
            ErrorCode::InvalidResponse,
            format!("feed {} answered zero, cannot invert", feed.address),
        ));
    }
    Decimal::ONE.checked_div(price).ok_or_else(|| {
        ErrorWithCode::new(ErrorCode::InvalidResponse, "inverted price out of range")
    })
}

/// Decode an ABI `int256` return word (`0x` + 64 hex digits).
///
/// Only values that fit in an `i128` are accepted; the upper half must be a
/// pure sign extension.
fn decode_int256(value: &Value) -> Result<i128, ErrorWithCode> {
    let text = value
        .as_str()
        .ok_or_else(|| decode_error(format!("expected hex string, got {}", value)))?;
    let hex = text
        .strip_prefix("0x")
        .ok_or_else(|| decode_error(format!("missing 0x prefix in '{}'", text)))?;
    if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(decode_error(format!("expected a 32-byte word, got '{}'", text)));
    }

    let (high, low) = hex.split_at(32);
    let low = u128::from_str_radix(low, 16).map_err(|e| decode_error(e.to_string()))?;
    let negative_bit = low >> 127 == 1;

    if high.chars().all(|c| c == '0') && !negative_bit {
        Ok(low as i128)
    } else if high.chars().all(|c| c == 'f' || c == 'F') && negative_bit {
        Ok(low as i128)
    } else {
        Err(decode_error(format!("answer '{}' does not fit in 128 bits", text)))
    }
}

fn decode_error(message: String) -> ErrorWithCode {
    ErrorWithCode::new(ErrorCode::FailedToDecode, message)
}
