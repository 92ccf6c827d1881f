/// Classification of a per-ticker failure.
///
/// Every unresolved entry in a [`PriceResponse`](crate::models::PriceResponse)
/// carries one of these codes so the caller can tell a transport outage apart
/// from a bad ticker without inspecting the underlying cause.
///
/// | Code | Typical source |
/// |------|----------------|
/// | `CreateUrl` | venue handler could not build a request URL |
/// | `DoRequest` | network failure, timeout, or cancellation |
/// | `ParseResponse` | response body is not the expected shape |
/// | `RateLimit` | venue answered HTTP 429 |
/// | `UnexpectedStatusCode` | any other non-2xx HTTP status |
/// | `TickerMetadataNotFound` | ticker metadata JSON missing or invalid |
/// | `UnknownPair` | venue does not know the ticker |
/// | `FailedToParsePrice` | price field is not a decimal number |
/// | `FailedToDecode` | on-chain return data could not be decoded |
/// | `InvalidResponse` | response decoded but failed validation |
/// | `ApiGeneral` | venue returned an explicit error object |
/// | `Unknown` | anything else |
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorCode {
    CreateUrl,
    DoRequest,
    ParseResponse,
    RateLimit,
    UnexpectedStatusCode,
    TickerMetadataNotFound,
    UnknownPair,
    FailedToParsePrice,
    FailedToDecode,
    InvalidResponse,
    ApiGeneral,
    Unknown,
}

impl ErrorCode {
    /// Stable label, suitable for metrics and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateUrl => "create_url",
            Self::DoRequest => "do_request",
            Self::ParseResponse => "parse_response",
            Self::RateLimit => "rate_limit",
            Self::UnexpectedStatusCode => "unexpected_status_code",
            Self::TickerMetadataNotFound => "ticker_metadata_not_found",
            Self::UnknownPair => "unknown_pair",
            Self::FailedToParsePrice => "failed_to_parse_price",
            Self::FailedToDecode => "failed_to_decode",
            Self::InvalidResponse => "invalid_response",
            Self::ApiGeneral => "api_general",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the failure is attributable to the venue or network rather
    /// than to static configuration.
    ///
    /// Configuration-shaped failures (bad metadata, unknown pair) will repeat
    /// every cycle until the config changes.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::CreateUrl | Self::TickerMetadataNotFound | Self::UnknownPair
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
