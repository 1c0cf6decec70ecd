//! Shard-to-shard coordination messages
//!
//! The transport itself is outside this crate: a `Sender` delivers one
//! request to the service at `address` and returns its response. Messages
//! are plain serde types and travel as JSON.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use serde::{Deserialize, Serialize};

use crate::mvcc::Timestamp;
use crate::storage::Mutation;
use crate::txn::{TxnError, TxnId, TxnResult};

use super::ShardTxnService;

/// Requests a coordinator sends to participant shards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TxnRequest {
    /// Apply a write on behalf of `txn`, enlisting this shard.
    Write {
        txn: TxnId,
        begin_ts: Timestamp,
        database: String,
        relation: String,
        mutation: Mutation,
    },
    /// Vote on whether `txn` can still commit here.
    Prepare { txn: TxnId },
    /// Publish `txn` no earlier than `commit_ts`.
    Commit { txn: TxnId, commit_ts: Timestamp },
    /// Discard `txn`.
    Abort { txn: TxnId },
}

impl TxnRequest {
    pub fn txn(&self) -> TxnId {
        match self {
            TxnRequest::Write { txn, .. }
            | TxnRequest::Prepare { txn }
            | TxnRequest::Commit { txn, .. }
            | TxnRequest::Abort { txn } => *txn,
        }
    }

    pub fn encode(&self) -> TxnResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| TxnError::internal(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> TxnResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| TxnError::internal(e.to_string()))
    }
}

/// Participant replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TxnResponse {
    Ok,
    Prepared,
    Committed { commit_ts: Timestamp },
    Failed { code: String, message: String },
}

impl TxnResponse {
    pub fn failed(err: &TxnError) -> Self {
        TxnResponse::Failed {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    /// Maps a `Failed` reply to `TxnError::Remote`.
    pub fn into_result(self, address: &str) -> TxnResult<Self> {
        match self {
            TxnResponse::Failed { message, .. } => Err(TxnError::Remote {
                address: address.to_string(),
                message,
            }),
            other => Ok(other),
        }
    }

    pub fn encode(&self) -> TxnResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| TxnError::internal(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> TxnResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| TxnError::internal(e.to_string()))
    }
}

/// Delivers coordination requests to other shards.
pub trait Sender: Send + Sync {
    fn send(&self, address: &str, request: TxnRequest) -> TxnResult<TxnResponse>;
}

/// Sender for shards living in the same process.
///
/// Requests still round-trip through the wire encoding. Services are held
/// weakly so a service may own the router that points back at it.
#[derive(Default)]
pub struct LocalSender {
    routes: RwLock<HashMap<String, Weak<ShardTxnService>>>,
}

impl LocalSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes requests for the service's shard address to it.
    pub fn register(&self, service: &Arc<ShardTxnService>) -> TxnResult<()> {
        self.routes
            .write()?
            .insert(service.shard().address.clone(), Arc::downgrade(service));
        Ok(())
    }

    pub fn unregister(&self, address: &str) -> TxnResult<()> {
        self.routes.write()?.remove(address);
        Ok(())
    }
}

impl Sender for LocalSender {
    fn send(&self, address: &str, request: TxnRequest) -> TxnResult<TxnResponse> {
        let unreachable = |message: &str| TxnError::Remote {
            address: address.to_string(),
            message: message.to_string(),
        };
        let service = self
            .routes
            .read()?
            .get(address)
            .and_then(Weak::upgrade)
            .ok_or_else(|| unreachable("no route"))?;

        let request = TxnRequest::decode(&request.encode()?)?;
        let response = service.handle(request);
        TxnResponse::decode(&response.encode()?)
    }
}

/// Sender for single-shard deployments. Every request fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSender;

impl Sender for NoopSender {
    fn send(&self, address: &str, _request: TxnRequest) -> TxnResult<TxnResponse> {
        Err(TxnError::Remote {
            address: address.to_string(),
            message: "no transport configured".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    #[test]
    fn test_request_wire_format() {
        let txn = TxnId::new();
        let request = TxnRequest::Write {
            txn,
            begin_ts: Timestamp::new(7),
            database: "db1".into(),
            relation: "t1".into(),
            mutation: Mutation::Insert(row![1i64, "a"]),
        };
        let json: serde_json::Value = serde_json::from_slice(&request.encode().unwrap()).unwrap();
        assert_eq!(json["op"], "write");
        assert_eq!(json["begin_ts"], 7);
        assert_eq!(TxnRequest::decode(&request.encode().unwrap()).unwrap().txn(), txn);
    }

    #[test]
    fn test_failed_response_maps_to_remote() {
        let response = TxnResponse::failed(&TxnError::Existed);
        let err = response.into_result("shard-2").unwrap_err();
        assert_eq!(
            err,
            TxnError::Remote {
                address: "shard-2".into(),
                message: "existed".into(),
            }
        );
        assert_eq!(TxnResponse::Prepared.into_result("x"), Ok(TxnResponse::Prepared));
    }

    #[test]
    fn test_unknown_route() {
        let sender = LocalSender::new();
        let err = sender
            .send("shard-9", TxnRequest::Abort { txn: TxnId::new() })
            .unwrap_err();
        assert!(matches!(err, TxnError::Remote { .. }));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            TxnRequest::decode(b"{\"op\":\"nope\"}"),
            Err(TxnError::Internal(_))
        ));
    }
}
