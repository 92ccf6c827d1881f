use serde_json::{json, Value};

use super::RpcRequest;

/// Auxiliary request whose reply tells how up to date a node is.
///
/// Higher values are fresher. Zero is treated as "no information".
pub trait FreshnessProbe: Send + Sync {
    fn request(&self) -> RpcRequest;

    /// Decode the probe reply, `None` if it is not a freshness number.
    fn decode(&self, reply: &Value) -> Option<u64>;
}

/// Latest block height of an EVM node (`eth_blockNumber`).
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockNumberProbe;

impl FreshnessProbe for BlockNumberProbe {
    fn request(&self) -> RpcRequest {
        RpcRequest::new("eth_blockNumber", json!([]))
    }

    /// Block numbers are hex quantities such as `"0x1b4"`.
    fn decode(&self, reply: &Value) -> Option<u64> {
        let text = reply.as_str()?;
        let digits = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))?;
        u64::from_str_radix(digits, 16).ok()
    }
}

/// Latest processed slot of a Solana node (`getSlot`).
#[derive(Clone, Copy, Debug, Default)]
pub struct SlotProbe;

impl FreshnessProbe for SlotProbe {
    fn request(&self) -> RpcRequest {
        RpcRequest::new("getSlot", json!([{"commitment": "confirmed"}]))
    }

    fn decode(&self, reply: &Value) -> Option<u64> {
        reply.as_u64()
    }
}
