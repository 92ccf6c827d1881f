//! JSON-RPC 2.0 batch transport over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{RpcError, RpcReply, RpcRequest, Transport};
use crate::config::Endpoint;
use crate::errors::TransportError;

/// Sends each batch as one JSON-RPC array POST to a single node.
pub struct JsonRpcHttpTransport {
    client: Client,
    url: String,
}

impl JsonRpcHttpTransport {
    /// Create a transport for `endpoint`; every request is bounded by
    /// `timeout` and carries the endpoint's authentication header, if any.
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        if let Some(auth) = &endpoint.authentication {
            let name = HeaderName::from_bytes(auth.api_key_header.as_bytes())
                .map_err(|e| TransportError::Request(format!("invalid header name: {}", e)))?;
            let mut value = HeaderValue::from_str(&auth.api_key)
                .map_err(|e| TransportError::Request(format!("invalid header value: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            url: endpoint.url,
        })
    }

    async fn send(&self, requests: &[RpcRequest]) -> Result<Vec<RpcReply>, TransportError> {
        let body: Vec<Value> = requests
            .iter()
            .enumerate()
            .map(|(id, request)| {
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "method": request.method,
                    "params": request.params,
                })
            })
            .collect();

        debug!("RPC batch of {} request(s) to {}", requests.len(), self.url);

        let response = self.client.post(&self.url).json(&body).send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TransportError::RateLimited {
                endpoint: self.url.clone(),
            });
        }
        if !status.is_success() {
            return Err(TransportError::UnexpectedStatus {
                endpoint: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        decode_batch(payload, requests.len())
    }
}

#[async_trait]
impl Transport for JsonRpcHttpTransport {
    fn name(&self) -> &str {
        &self.url
    }

    async fn call(
        &self,
        cancel: &CancellationToken,
        requests: &[RpcRequest],
    ) -> Result<Vec<RpcReply>, TransportError> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            result = self.send(requests) => result,
        }
    }
}

#[derive(Deserialize)]
struct RawReply {
    id: u64,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Order batch replies by id. Nodes may answer out of order, and some answer
/// a whole batch with a single error object.
fn decode_batch(payload: Value, expected: usize) -> Result<Vec<RpcReply>, TransportError> {
    let items = match payload {
        Value::Array(items) => items,
        Value::Object(mut object) => {
            let error = object
                .remove("error")
                .ok_or_else(|| TransportError::Decode("expected a batch reply".to_string()))?;
            let error: RpcError = serde_json::from_value(error)
                .map_err(|e| TransportError::Decode(e.to_string()))?;
            return Err(TransportError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        other => {
            return Err(TransportError::Decode(format!(
                "unexpected batch payload: {}",
                other
            )))
        }
    };

    let mut slots: Vec<Option<RpcReply>> = vec![None; expected];
    for item in items {
        let reply: RawReply =
            serde_json::from_value(item).map_err(|e| TransportError::Decode(e.to_string()))?;
        let slot = slots
            .get_mut(reply.id as usize)
            .ok_or_else(|| TransportError::Decode(format!("unexpected reply id {}", reply.id)))?;
        *slot = Some(match reply.error {
            Some(error) => Err(error),
            None => Ok(reply.result),
        });
    }

    let got = slots.iter().filter(|slot| slot.is_some()).count();
    if got != expected {
        return Err(TransportError::ReplyCountMismatch { expected, got });
    }
    Ok(slots.into_iter().flatten().collect())
}
