//! Low-level request transports.
//!
//! A [`Transport`] sends a batch of opaque JSON-RPC style requests and
//! returns one reply per request, in request order. Venue glue builds the
//! requests and decodes the replies; the transport only moves bytes.
//!
//! [`MultiEndpointTransport`] wraps several transports pointed at redundant
//! nodes behind the same contract, so callers cannot tell one node from many.

mod http;
mod multi;
mod probe;

pub use http::JsonRpcHttpTransport;
pub use multi::MultiEndpointTransport;
pub use probe::{BlockNumberProbe, FreshnessProbe, SlotProbe};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::ProviderConfig;
use crate::errors::{OracleError, TransportError};

/// One request in a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Error object returned for a single request of a batch.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("RPC error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// Per-request outcome within a successful batch.
pub type RpcReply = Result<Value, RpcError>;

/// Send a batch of requests, get back a batch of replies.
///
/// A returned `Ok` holds exactly one reply per request, in request order.
/// An `Err` means the batch as a whole failed. Implementations must stop
/// waiting and return promptly once `cancel` is triggered.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Label used in logs and aggregate errors.
    fn name(&self) -> &str;

    async fn call(
        &self,
        cancel: &CancellationToken,
        requests: &[RpcRequest],
    ) -> Result<Vec<RpcReply>, TransportError>;
}

/// Build the RPC transport for a provider's endpoints.
///
/// One endpoint gives a plain HTTP transport; several give a
/// [`MultiEndpointTransport`] that keeps the freshest reply according to
/// `probe`.
pub fn build_rpc_transport(
    config: &ProviderConfig,
    probe: Arc<dyn FreshnessProbe>,
) -> Result<Arc<dyn Transport>, OracleError> {
    config.validate()?;
    if !config.api.enabled {
        return Err(OracleError::InvalidConfig {
            provider: config.name.clone(),
            message: "rpc transport requires an api config".to_string(),
        });
    }

    let mut transports: Vec<Arc<dyn Transport>> = Vec::with_capacity(config.api.endpoints.len());
    for endpoint in &config.api.endpoints {
        let transport = JsonRpcHttpTransport::new(endpoint.clone(), config.api.timeout)
            .map_err(|e| OracleError::InvalidConfig {
                provider: config.name.clone(),
                message: e.to_string(),
            })?;
        transports.push(Arc::new(transport));
    }

    if transports.len() == 1 {
        return Ok(transports.remove(0));
    }

    let multi = MultiEndpointTransport::new(config.name.clone(), transports, probe)?;
    Ok(Arc::new(multi))
}
