use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::OracleError;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_RECONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_MAX_QUERIES: usize = 1;

const DEFAULT_WS_BUFFER_SIZE: usize = 1024;
const DEFAULT_WS_RECONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Header credentials sent with every request to an endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Authentication {
    pub api_key_header: String,
    pub api_key: String,
}

impl Authentication {
    pub fn validate(&self) -> Result<(), String> {
        if self.api_key_header.trim().is_empty() {
            return Err("authentication header name is empty".to_string());
        }
        if self.api_key.is_empty() {
            return Err("authentication key is empty".to_string());
        }
        Ok(())
    }
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authentication")
            .field("api_key_header", &self.api_key_header)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// One physical network target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Endpoint {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<Authentication>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            authentication: None,
        }
    }

    pub fn with_authentication(
        mut self,
        header: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        self.authentication = Some(Authentication {
            api_key_header: header.into(),
            api_key: key.into(),
        });
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("endpoint url is empty".to_string());
        }
        if let Some(auth) = &self.authentication {
            auth.validate()?;
        }
        Ok(())
    }
}

/// Request/response (HTTP or RPC) provider settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Must match the owning provider's name. Filled in by the loader when
    /// left empty.
    #[serde(default)]
    pub name: String,

    /// Upper bound on one fetch cycle, measured from cycle start.
    #[serde(rename = "timeout_ms", with = "duration_ms", default = "default_timeout")]
    pub timeout: Duration,

    /// Cadence of fetch cycles; owned by the scheduler.
    #[serde(rename = "interval_ms", with = "duration_ms", default = "default_interval")]
    pub interval: Duration,

    #[serde(
        rename = "reconnect_timeout_ms",
        with = "duration_ms",
        default = "default_reconnect_timeout"
    )]
    pub reconnect_timeout: Duration,

    /// Maximum requests in flight at once.
    #[serde(default = "default_max_queries")]
    pub max_queries: usize,

    /// Whether one request can price every ticker.
    #[serde(default)]
    pub atomic: bool,

    /// Tickers per request for non-atomic providers; 0 or 1 means one
    /// ticker per request.
    #[serde(default)]
    pub batch_size: usize,

    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: String::new(),
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
            reconnect_timeout: DEFAULT_RECONNECT_TIMEOUT,
            max_queries: DEFAULT_MAX_QUERIES,
            atomic: false,
            batch_size: 0,
            endpoints: Vec::new(),
        }
    }
}

impl ApiConfig {
    /// Validate the settings. A disabled config is always valid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if self.name.trim().is_empty() {
            return Err("api name is empty".to_string());
        }
        if self.timeout.is_zero() {
            return Err("timeout must be positive".to_string());
        }
        if self.interval.is_zero() {
            return Err("interval must be positive".to_string());
        }
        if self.timeout > self.interval {
            return Err(format!(
                "timeout ({:?}) must not exceed interval ({:?})",
                self.timeout, self.interval
            ));
        }
        if self.reconnect_timeout.is_zero() {
            return Err("reconnect timeout must be positive".to_string());
        }
        if self.max_queries < 1 {
            return Err("max_queries must be at least 1".to_string());
        }
        if self.endpoints.is_empty() {
            return Err("at least one endpoint is required".to_string());
        }
        for endpoint in &self.endpoints {
            endpoint.validate()?;
        }
        Ok(())
    }

    /// Tickers packed into one request.
    pub fn chunk_size(&self, tickers: usize) -> usize {
        if self.atomic {
            tickers.max(1)
        } else {
            self.batch_size.max(1)
        }
    }
}

/// Streaming provider settings.
///
/// Websocket providers run their own connection handling and only share the
/// fetch contract with request/response providers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebSocketConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub endpoints: Vec<Endpoint>,

    #[serde(default = "default_ws_buffer_size")]
    pub max_buffer_size: usize,

    #[serde(
        rename = "reconnection_timeout_ms",
        with = "duration_ms",
        default = "default_ws_reconnection_timeout"
    )]
    pub reconnection_timeout: Duration,

    /// Zero disables pings.
    #[serde(rename = "ping_interval_ms", with = "duration_ms", default)]
    pub ping_interval: Duration,

    /// Zero means unlimited.
    #[serde(default)]
    pub max_subscriptions_per_connection: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: String::new(),
            endpoints: Vec::new(),
            max_buffer_size: DEFAULT_WS_BUFFER_SIZE,
            reconnection_timeout: DEFAULT_WS_RECONNECTION_TIMEOUT,
            ping_interval: Duration::ZERO,
            max_subscriptions_per_connection: 0,
        }
    }
}

impl WebSocketConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if self.name.trim().is_empty() {
            return Err("websocket name is empty".to_string());
        }
        if self.endpoints.is_empty() {
            return Err("at least one websocket endpoint is required".to_string());
        }
        for endpoint in &self.endpoints {
            endpoint.validate()?;
        }
        if self.max_buffer_size < 1 {
            return Err("max_buffer_size must be at least 1".to_string());
        }
        if self.reconnection_timeout.is_zero() {
            return Err("reconnection timeout must be positive".to_string());
        }
        Ok(())
    }
}

/// Static description of one provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    pub name: String,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default, rename = "websocket")]
    pub web_socket: WebSocketConfig,
}

impl ProviderConfig {
    /// Request/response provider with the given endpoints and defaults for
    /// everything else.
    pub fn api(name: impl Into<String>, endpoints: Vec<Endpoint>) -> Self {
        let name = name.into();
        Self {
            api: ApiConfig {
                enabled: true,
                name: name.clone(),
                endpoints,
                ..ApiConfig::default()
            },
            web_socket: WebSocketConfig::default(),
            name,
        }
    }

    /// Fill sub-config names left empty with the provider name.
    pub fn apply_defaults(&mut self) {
        if self.api.name.is_empty() {
            self.api.name = self.name.clone();
        }
        if self.web_socket.name.is_empty() {
            self.web_socket.name = self.name.clone();
        }
    }

    pub fn validate(&self) -> Result<(), OracleError> {
        if self.name.trim().is_empty() {
            return Err(self.invalid("provider name is empty"));
        }

        match (self.api.enabled, self.web_socket.enabled) {
            (true, true) => {
                return Err(self.invalid("api and websocket cannot both be enabled"));
            }
            (false, false) => {
                return Err(self.invalid("one of api or websocket must be enabled"));
            }
            _ => {}
        }

        if self.api.enabled && self.api.name != self.name {
            return Err(OracleError::NameMismatch {
                expected: self.name.clone(),
                got: self.api.name.clone(),
            });
        }
        if self.web_socket.enabled && self.web_socket.name != self.name {
            return Err(OracleError::NameMismatch {
                expected: self.name.clone(),
                got: self.web_socket.name.clone(),
            });
        }

        self.api.validate().map_err(|message| self.invalid(message))?;
        self.web_socket
            .validate()
            .map_err(|message| self.invalid(message))?;
        Ok(())
    }

    fn invalid(&self, message: impl Into<String>) -> OracleError {
        OracleError::InvalidConfig {
            provider: self.name.clone(),
            message: message.into(),
        }
    }
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_reconnect_timeout() -> Duration {
    DEFAULT_RECONNECT_TIMEOUT
}

fn default_max_queries() -> usize {
    DEFAULT_MAX_QUERIES
}

fn default_ws_buffer_size() -> usize {
    DEFAULT_WS_BUFFER_SIZE
}

fn default_ws_reconnection_timeout() -> Duration {
    DEFAULT_WS_RECONNECTION_TIMEOUT
}

/// Durations are configured as whole milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
