//! The "submit a batch, await ordered results" surface shared by external
//! clients and in-process loopback handles.

use async_trait::async_trait;
use muxd_protocol_types::Call;
use serde_json::Value;

/// Something that can run a batch of calls and return their payloads in
/// order.
///
/// Handler code written against `Connection` works the same whether it runs
/// inside the daemon (through a [`LoopbackHandle`](crate::LoopbackHandle))
/// or in a separate process (through a [`MuxClient`](crate::MuxClient)).
#[async_trait]
pub trait Connection: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Run `calls` as one batch. Either every call succeeds and one payload
    /// per call is returned, or the whole batch fails.
    async fn send(&self, calls: Vec<Call>) -> Result<Vec<Value>, Self::Error>;
}
