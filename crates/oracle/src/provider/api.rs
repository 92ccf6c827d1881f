//! Generic request/response fetcher for HTTP venues.
//!
//! A venue only describes its wire format through [`ApiDataHandler`]: how to
//! build the URL for a batch of tickers and how to turn a response body into
//! prices. [`RestRequestHandler`] owns the HTTP client and maps transport
//! failures into the error taxonomy, and [`ApiPriceFetcher`] glues the two
//! together behind the [`PriceFetcher`] contract.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{ApiConfig, Endpoint, ProviderConfig};
use crate::engine::PriceFetcher;
use crate::errors::{ErrorWithCode, OracleError, TransportError};
use crate::models::{PriceResponse, ProviderTicker};

/// Venue wire format.
pub trait ApiDataHandler: Send + Sync {
    /// URL pricing `tickers` in one request.
    fn create_url(&self, tickers: &[ProviderTicker]) -> Result<String, ErrorWithCode>;

    /// Decode a successful response body.
    ///
    /// Tickers the body does not price should be reported unresolved.
    fn parse_response(&self, tickers: &[ProviderTicker], body: &str) -> PriceResponse;
}

/// The single endpoint a REST venue talks to.
///
/// Redundant endpoints are only supported for JSON-RPC transports, so a
/// REST config listing more than one is rejected instead of silently using
/// the first.
pub fn rest_endpoint(api: &ApiConfig) -> Result<&Endpoint, OracleError> {
    match api.endpoints.as_slice() {
        [endpoint] => Ok(endpoint),
        endpoints => Err(OracleError::InvalidConfig {
            provider: api.name.clone(),
            message: format!(
                "rest providers take exactly one endpoint, got {}",
                endpoints.len()
            ),
        }),
    }
}

/// HTTP GET with the provider's authentication and timeout.
pub struct RestRequestHandler {
    client: Client,
}

impl RestRequestHandler {
    /// Build a client for `api`. The endpoint's authentication header, if
    /// any, is sent with every request.
    pub fn new(api: &ApiConfig) -> Result<Self, OracleError> {
        let mut headers = HeaderMap::new();
        if let Some(auth) = rest_endpoint(api)?.authentication.as_ref() {
            let name = HeaderName::from_bytes(auth.api_key_header.as_bytes()).map_err(|e| {
                OracleError::InvalidConfig {
                    provider: api.name.clone(),
                    message: format!("invalid authentication header: {}", e),
                }
            })?;
            let mut value =
                HeaderValue::from_str(&auth.api_key).map_err(|e| OracleError::InvalidConfig {
                    provider: api.name.clone(),
                    message: format!("invalid authentication value: {}", e),
                })?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(api.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| OracleError::InvalidConfig {
                provider: api.name.clone(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    /// GET `url` and return the body of a 2xx response.
    pub async fn get(
        &self,
        cancel: &CancellationToken,
        url: &str,
    ) -> Result<String, TransportError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            result = self.send(url) => result,
        }
    }

    async fn send(&self, url: &str) -> Result<String, TransportError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::RateLimited {
                endpoint: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(TransportError::UnexpectedStatus {
                endpoint: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// [`PriceFetcher`] for any HTTP venue described by an [`ApiDataHandler`].
pub struct ApiPriceFetcher<H> {
    name: String,
    handler: H,
    requests: RestRequestHandler,
}

impl<H: ApiDataHandler> ApiPriceFetcher<H> {
    pub fn new(config: &ProviderConfig, handler: H) -> Result<Self, OracleError> {
        Ok(Self {
            name: config.name.clone(),
            requests: RestRequestHandler::new(&config.api)?,
            handler,
        })
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

#[async_trait]
impl<H: ApiDataHandler> PriceFetcher for ApiPriceFetcher<H> {
    async fn fetch(&self, cancel: &CancellationToken, tickers: &[ProviderTicker]) -> PriceResponse {
        let url = match self.handler.create_url(tickers) {
            Ok(url) => url,
            Err(error) => {
                warn!("{}: failed to create url: {}", self.name, error);
                return PriceResponse::all_unresolved(tickers, error);
            }
        };

        debug!("{}: requesting {} ticker(s)", self.name, tickers.len());

        match self.requests.get(cancel, &url).await {
            Ok(body) => self.handler.parse_response(tickers, &body),
            Err(error) => {
                warn!("{}: request failed: {}", self.name, error);
                PriceResponse::all_unresolved(tickers, error.into())
            }
        }
    }
}
