//! Error types for the oracle crate.
//!
//! This module provides:
//! - [`ErrorCode`]: the per-ticker failure taxonomy
//! - [`ErrorWithCode`]: a classified, cloneable per-ticker failure
//! - [`OracleError`]: construction, validation and conversion errors
//! - [`TransportError`]: failures of the low-level request transports

mod code;

pub use code::ErrorCode;

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::models::CurrencyPair;

/// A classified failure attached to a single ticker.
///
/// The cause is reference counted so the same failure can be reported for
/// every ticker of a failed batch and propagated through price conversion.
#[derive(Clone, Debug)]
pub struct ErrorWithCode {
    code: ErrorCode,
    cause: Arc<dyn StdError + Send + Sync>,
}

impl ErrorWithCode {
    pub fn new<E>(code: ErrorCode, cause: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self {
            code,
            cause: Arc::from(cause.into()),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn cause(&self) -> &(dyn StdError + Send + Sync) {
        self.cause.as_ref()
    }
}

impl fmt::Display for ErrorWithCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.cause)
    }
}

impl StdError for ErrorWithCode {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.cause.as_ref())
    }
}

impl From<TransportError> for ErrorWithCode {
    fn from(err: TransportError) -> Self {
        Self::new(err.code(), err)
    }
}

/// Errors raised while building providers, validating configuration, or
/// converting prices.
///
/// Construction and validation errors are fatal: a provider that fails
/// with one of these never runs.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Invalid currency pair: {0}")]
    InvalidCurrencyPair(String),

    #[error("Invalid config for provider '{provider}': {message}")]
    InvalidConfig { provider: String, message: String },

    /// Two pieces of configuration name different providers.
    #[error("Provider name mismatch: expected '{expected}', got '{got}'")]
    NameMismatch { expected: String, got: String },

    #[error("Invalid market config for {market}: {message}")]
    InvalidMarket { market: String, message: String },

    #[error("Conversion path {index} has {legs} leg(s), at least 2 are required")]
    PathTooShort { index: usize, legs: usize },

    #[error("Conversion path endpoint mismatch: expected {expected}, got {got}")]
    EndpointMismatch { expected: String, got: String },

    #[error("Broken conversion chain: expected {expected}, got {got}")]
    BrokenChain { expected: String, got: String },

    /// A leg of a conversion path had no price this cycle.
    #[error("Unresolved conversion leg {pair}: {source}")]
    UnresolvedLeg {
        pair: CurrencyPair,
        #[source]
        source: ErrorWithCode,
    },

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

impl OracleError {
    /// The per-ticker classification carried by this error, if any.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::UnresolvedLeg { source, .. } => Some(source.code()),
            _ => None,
        }
    }
}

/// Failures of a [`Transport`](crate::transport::Transport) call.
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Rate limited by {endpoint}")]
    RateLimited { endpoint: String },

    #[error("Unexpected status {status} from {endpoint}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Reply count mismatch: expected {expected}, got {got}")]
    ReplyCountMismatch { expected: usize, got: usize },

    /// No redundant endpoint produced a usable reply.
    #[error("No usable result from {endpoints} endpoint(s): [{}]", join_errors(.errors))]
    NoUsableResult {
        endpoints: usize,
        errors: Vec<TransportError>,
    },
}

impl TransportError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Request(_) | Self::Timeout | Self::Cancelled | Self::NoUsableResult { .. } => {
                ErrorCode::DoRequest
            }
            Self::RateLimited { .. } => ErrorCode::RateLimit,
            Self::UnexpectedStatus { .. } => ErrorCode::UnexpectedStatusCode,
            Self::Decode(_) => ErrorCode::ParseResponse,
            Self::Rpc { .. } => ErrorCode::ApiGeneral,
            Self::ReplyCountMismatch { .. } => ErrorCode::InvalidResponse,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

fn join_errors(errors: &[TransportError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
