//! Redundant-node selection: query every node, keep the freshest reply.
//!
//! Each batch is extended with a freshness probe (block height, slot) and
//! sent to every node concurrently. The reply whose probe decodes to the
//! highest value wins. A lagging or unreachable node therefore never
//! determines the result as long as one healthy node answers.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, warn};
use tokio_util::sync::CancellationToken;

use super::{FreshnessProbe, RpcReply, RpcRequest, Transport};
use crate::errors::{OracleError, TransportError};

pub struct MultiEndpointTransport {
    name: String,
    transports: Vec<Arc<dyn Transport>>,
    probe: Arc<dyn FreshnessProbe>,
}

impl MultiEndpointTransport {
    pub fn new(
        name: impl Into<String>,
        transports: Vec<Arc<dyn Transport>>,
        probe: Arc<dyn FreshnessProbe>,
    ) -> Result<Self, OracleError> {
        let name = name.into();
        if transports.is_empty() {
            return Err(OracleError::InvalidConfig {
                provider: name,
                message: "multi-endpoint transport needs at least one endpoint".to_string(),
            });
        }
        Ok(Self {
            name,
            transports,
            probe,
        })
    }

    pub fn endpoints(&self) -> usize {
        self.transports.len()
    }

    /// Separate the probe reply from the caller's replies.
    fn split_probe(
        &self,
        mut replies: Vec<RpcReply>,
        expected: usize,
    ) -> Result<(u64, Vec<RpcReply>), TransportError> {
        if replies.len() != expected + 1 {
            return Err(TransportError::ReplyCountMismatch {
                expected: expected + 1,
                got: replies.len(),
            });
        }

        let freshness = match replies.pop() {
            Some(Ok(value)) => self.probe.decode(&value).ok_or_else(|| {
                TransportError::Decode(format!("invalid freshness probe reply: {}", value))
            })?,
            Some(Err(error)) => {
                return Err(TransportError::Rpc {
                    code: error.code,
                    message: error.message,
                })
            }
            None => 0,
        };

        Ok((freshness, replies))
    }
}

#[async_trait]
impl Transport for MultiEndpointTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(
        &self,
        cancel: &CancellationToken,
        requests: &[RpcRequest],
    ) -> Result<Vec<RpcReply>, TransportError> {
        let mut batch = Vec::with_capacity(requests.len() + 1);
        batch.extend_from_slice(requests);
        batch.push(self.probe.request());
        let batch = &batch;

        let mut pending: FuturesUnordered<_> = self
            .transports
            .iter()
            .map(|transport| async move { (transport.name(), transport.call(cancel, batch).await) })
            .collect();

        let mut best_freshness = 0u64;
        let mut best: Option<Vec<RpcReply>> = None;
        let mut errors = Vec::new();

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    debug!(
                        "{}: cancelled with {} endpoint(s) still pending",
                        self.name,
                        pending.len()
                    );
                    break;
                }
                next = pending.next() => {
                    let Some((endpoint, result)) = next else {
                        break;
                    };
                    match result.and_then(|replies| self.split_probe(replies, requests.len())) {
                        Ok((freshness, replies)) => {
                            if freshness > best_freshness {
                                debug!(
                                    "{}: endpoint {} is freshest so far at {}",
                                    self.name, endpoint, freshness
                                );
                                best_freshness = freshness;
                                best = Some(replies);
                            } else {
                                debug!(
                                    "{}: endpoint {} at {} is not fresher than {}",
                                    self.name, endpoint, freshness, best_freshness
                                );
                            }
                        }
                        Err(err) => {
                            warn!("{}: endpoint {} failed: {}", self.name, endpoint, err);
                            errors.push(err);
                        }
                    }
                }
            }
        }

        match best {
            Some(replies) if best_freshness > 0 => Ok(replies),
            _ => Err(TransportError::NoUsableResult {
                endpoints: self.transports.len(),
                errors,
            }),
        }
    }
}
