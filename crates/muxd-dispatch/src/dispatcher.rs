//! Batch dispatcher.
//!
//! Runs each entry of a batch through its registered handler, strictly one
//! after another, and collects the results in input order. The first failure
//! aborts the batch and no results are returned.
//!
//! ## Ambiguous effects
//!
//! Entries that ran before a failing entry are not rolled back. A rejected
//! batch therefore tells the caller nothing about which of its requests took
//! effect. Callers that need to know must split work across batches.

use std::fmt::Debug;
use std::sync::Arc;

use muxd_protocol_types::{BatchResponse, RequestEnvelope, ResultEntry};
use tracing::{debug, debug_span, warn, Instrument};

use crate::{DispatchContext, DispatchError, HandlerRegistry, LoopbackHandle, Resolution};

/// Tracing target for dispatch operations.
pub const DISPATCH_TARGET: &str = "muxd_dispatch::dispatch";

/// Default limit on nested loopback batches.
pub const DEFAULT_MAX_LOOPBACK_DEPTH: usize = 16;

/// Dispatcher tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherOptions {
    /// Deepest loopback nesting allowed. Transport batches run at depth 0.
    pub max_loopback_depth: usize,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            max_loopback_depth: DEFAULT_MAX_LOOPBACK_DEPTH,
        }
    }
}

struct DispatcherInner<C> {
    registry: HandlerRegistry<C>,
    options: DispatcherOptions,
}

/// Routes batches to handlers.
///
/// Cheap to clone; clones share one frozen registry. Independent batches may
/// be processed concurrently from different tasks.
pub struct Dispatcher<C> {
    inner: Arc<DispatcherInner<C>>,
}

impl<C> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> Dispatcher<C> {
    /// Freeze `registry` and build a dispatcher over it.
    pub fn new(registry: HandlerRegistry<C>, options: DispatcherOptions) -> Self {
        Self {
            inner: Arc::new(DispatcherInner { registry, options }),
        }
    }

    pub fn registry(&self) -> &HandlerRegistry<C> {
        &self.inner.registry
    }

    pub fn options(&self) -> DispatcherOptions {
        self.inner.options
    }
}

impl<C> Dispatcher<C>
where
    C: Clone + Debug + Send + Sync + 'static,
{
    /// Process a batch from the transport on behalf of `caller`.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::UnknownHandler`] if an entry's type resolves to
    ///   nothing. Entries before it have already run.
    /// - Whatever the first failing handler raised, classified by
    ///   [`DispatchError::from_handler`].
    pub async fn process_batch(
        &self,
        entries: Vec<RequestEnvelope>,
        caller: C,
    ) -> Result<Vec<ResultEntry>, DispatchError> {
        self.process_at_depth(entries, caller, 0).await
    }

    /// Process a batch and translate the outcome into a wire response.
    pub async fn respond(&self, entries: Vec<RequestEnvelope>, caller: C) -> BatchResponse {
        match self.process_batch(entries, caller).await {
            Ok(results) => BatchResponse::success(results),
            Err(error) => BatchResponse::error(error.descriptor()),
        }
    }

    pub(crate) async fn process_at_depth(
        &self,
        entries: Vec<RequestEnvelope>,
        caller: C,
        depth: usize,
    ) -> Result<Vec<ResultEntry>, DispatchError> {
        let limit = self.inner.options.max_loopback_depth;
        if depth > limit {
            warn!(target: DISPATCH_TARGET, depth, limit, "loopback depth exceeded");
            return Err(DispatchError::LoopbackDepthExceeded { depth, limit });
        }

        let batch_len = entries.len();
        debug!(
            target: DISPATCH_TARGET,
            batch_len,
            depth,
            caller = ?caller,
            "processing batch"
        );

        // Entry events inherit `depth` and `batch_len` from this span.
        let span = debug_span!(target: DISPATCH_TARGET, "batch", depth, batch_len);
        self.run_entries(entries, caller, depth)
            .instrument(span)
            .await
    }

    async fn run_entries(
        &self,
        entries: Vec<RequestEnvelope>,
        caller: C,
        depth: usize,
    ) -> Result<Vec<ResultEntry>, DispatchError> {
        let batch_len = entries.len();
        let mut results = Vec::with_capacity(batch_len);

        for (index, entry) in entries.into_iter().enumerate() {
            let RequestEnvelope {
                id,
                request_type,
                args,
            } = entry;

            let handler = match self.inner.registry.resolve(&request_type) {
                Resolution::Found(handler) => handler,
                Resolution::UseDefault(handler) => {
                    debug!(
                        target: DISPATCH_TARGET,
                        request_type = %request_type,
                        "no specific handler, using default"
                    );
                    handler
                }
                Resolution::Absent => {
                    warn!(
                        target: DISPATCH_TARGET,
                        request_type = %request_type,
                        index,
                        batch_len,
                        depth,
                        "unknown request type, aborting batch"
                    );
                    return Err(DispatchError::UnknownHandler(request_type));
                }
            };

            let loopback = LoopbackHandle::new(self.clone(), caller.clone(), depth);
            let context =
                DispatchContext::new(request_type.clone(), args, caller.clone(), depth, loopback);

            debug!(
                target: DISPATCH_TARGET,
                request_type = %request_type,
                index,
                depth,
                "dispatching entry"
            );

            let payload = match handler(context).await {
                Ok(payload) => payload,
                Err(error) => {
                    let error = DispatchError::from_handler(&request_type, error);
                    warn!(
                        target: DISPATCH_TARGET,
                        request_type = %request_type,
                        index,
                        batch_len,
                        depth,
                        error = %error,
                        "handler failed, aborting batch"
                    );
                    return Err(error);
                }
            };

            results.push(ResultEntry::new(id, payload));
        }

        debug!(target: DISPATCH_TARGET, batch_len, depth, "batch completed");
        Ok(results)
    }
}

impl<C> Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.inner.registry)
            .field("options", &self.inner.options)
            .finish()
    }
}
