//! Dispatch and transport error types.

use muxd_protocol_types::{ErrorDescriptor, ErrorKind};
use thiserror::Error;

/// Errors raised by registration and batch processing.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A handler (or the default handler) was registered twice.
    #[error("Handler already registered: {0}")]
    AlreadyRegistered(String),

    /// A request type resolved to neither a specific nor a default handler.
    #[error("Unknown handler: {0}")]
    UnknownHandler(String),

    /// A nested loopback batch went past the configured depth limit.
    #[error("Loopback depth {depth} exceeds limit {limit}")]
    LoopbackDepthExceeded { depth: usize, limit: usize },

    /// Application handler code failed.
    #[error("Handler for {request_type} failed: {source}")]
    Handler {
        request_type: String,
        #[source]
        source: anyhow::Error,
    },
}

impl DispatchError {
    /// Name used when the default handler is registered twice.
    pub const DEFAULT_HANDLER_NAME: &'static str = "<default>";

    /// Classify a failure returned by handler code.
    ///
    /// Errors that already are `DispatchError`s (raised by a nested loopback
    /// call and bubbled up with `?`) pass through unchanged; anything else
    /// becomes [`DispatchError::Handler`].
    pub fn from_handler(request_type: &str, error: anyhow::Error) -> Self {
        match error.downcast::<DispatchError>() {
            Ok(nested) => nested,
            Err(source) => Self::Handler {
                request_type: request_type.to_string(),
                source,
            },
        }
    }

    /// Wire category for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownHandler(_) => ErrorKind::UnknownHandler,
            Self::LoopbackDepthExceeded { .. } => ErrorKind::LoopbackDepthExceeded,
            // Registration never happens during dispatch; treat a stray one
            // as an opaque failure.
            Self::AlreadyRegistered(_) | Self::Handler { .. } => ErrorKind::HandlerError,
        }
    }

    /// Descriptor sent to the transport in place of results.
    pub fn descriptor(&self) -> ErrorDescriptor {
        ErrorDescriptor::new(self.kind(), self.to_string())
    }
}

/// Transport and client error type.
#[derive(Error, Debug)]
pub enum IpcError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Socket error
    #[error("Socket error: {0}")]
    Socket(String),

    /// The server rejected the batch.
    #[error("Batch rejected: {0}")]
    Rejected(ErrorDescriptor),

    /// Connection closed
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type alias using IpcError.
pub type IpcResult<T> = Result<T, IpcError>;
