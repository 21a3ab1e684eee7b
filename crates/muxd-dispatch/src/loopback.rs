//! Loopback connection.
//!
//! Lets a handler issue a new batch into the dispatcher that is running it,
//! as if it were a client. The caller identity is bound when the handle is
//! created; nothing in the nested requests can change it.

use std::fmt::Debug;

use async_trait::async_trait;
use muxd_protocol_types::{Call, RequestEnvelope};
use serde_json::Value;

use crate::{Connection, DispatchError, Dispatcher};

/// In-process connection bound to one `(dispatcher, caller)` pair.
pub struct LoopbackHandle<C> {
    dispatcher: Dispatcher<C>,
    caller: C,
    depth: usize,
}

impl<C: Clone> Clone for LoopbackHandle<C> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            caller: self.caller.clone(),
            depth: self.depth,
        }
    }
}

impl<C> LoopbackHandle<C> {
    pub(crate) fn new(dispatcher: Dispatcher<C>, caller: C, depth: usize) -> Self {
        Self {
            dispatcher,
            caller,
            depth,
        }
    }

    /// Identity every nested request runs under.
    pub fn caller(&self) -> &C {
        &self.caller
    }

    /// Depth of the request that owns this handle. Batches sent through it
    /// run one level deeper.
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl<C> LoopbackHandle<C>
where
    C: Clone + Debug + Send + Sync + 'static,
{
    /// Run `calls` as a nested batch and return their payloads in order.
    ///
    /// Same semantics as [`Dispatcher::process_batch`]: strictly sequential,
    /// all-or-nothing. Calls get positional ids `0..n`.
    pub async fn send(&self, calls: Vec<Call>) -> Result<Vec<Value>, DispatchError> {
        let entries: Vec<RequestEnvelope> = calls
            .into_iter()
            .enumerate()
            .map(|(index, call)| call.into_envelope(index))
            .collect();

        let results = self
            .dispatcher
            .process_at_depth(entries, self.caller.clone(), self.depth + 1)
            .await?;

        Ok(results.into_iter().map(|entry| entry.payload).collect())
    }

    /// Run a single call through the loopback.
    pub async fn send_one(&self, request_type: &str, args: Value) -> Result<Value, DispatchError> {
        let mut payloads = self.send(vec![Call::new(request_type, args)]).await?;
        Ok(payloads.pop().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl<C> Connection for LoopbackHandle<C>
where
    C: Clone + Debug + Send + Sync + 'static,
{
    type Error = DispatchError;

    async fn send(&self, calls: Vec<Call>) -> Result<Vec<Value>, Self::Error> {
        LoopbackHandle::send(self, calls).await
    }
}

impl<C: Debug> Debug for LoopbackHandle<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackHandle")
            .field("caller", &self.caller)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}
