//! Per-request dispatch context.

use serde_json::Value;

use crate::LoopbackHandle;

/// Everything a handler receives for one request.
///
/// Built fresh for each entry and owned by the single handler invocation it
/// is passed to. The caller identity is fixed by the batch; handlers can read
/// it but never replace it.
pub struct DispatchContext<C> {
    request_type: String,
    args: Value,
    caller: C,
    depth: usize,
    loopback: LoopbackHandle<C>,
}

impl<C> DispatchContext<C> {
    pub(crate) fn new(
        request_type: String,
        args: Value,
        caller: C,
        depth: usize,
        loopback: LoopbackHandle<C>,
    ) -> Self {
        Self {
            request_type,
            args,
            caller,
            depth,
            loopback,
        }
    }

    /// Request type this handler was resolved for.
    pub fn request_type(&self) -> &str {
        &self.request_type
    }

    pub fn args(&self) -> &Value {
        &self.args
    }

    /// Take the arguments, dropping the rest of the context.
    pub fn into_args(self) -> Value {
        self.args
    }

    /// Identity of whoever issued the outermost batch.
    pub fn caller(&self) -> &C {
        &self.caller
    }

    /// Loopback nesting level: 0 for batches from the transport.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Connection back into the dispatcher under this request's caller.
    pub fn loopback(&self) -> &LoopbackHandle<C> {
        &self.loopback
    }
}

impl<C: std::fmt::Debug> std::fmt::Debug for DispatchContext<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchContext")
            .field("request_type", &self.request_type)
            .field("args", &self.args)
            .field("caller", &self.caller)
            .field("depth", &self.depth)
            .finish_non_exhaustive()
    }
}
