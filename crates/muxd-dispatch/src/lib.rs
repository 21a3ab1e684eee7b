//! Request-multiplexing dispatcher.
//!
//! A transport hands the [`Dispatcher`] an ordered batch of requests plus an
//! opaque caller identity. Each request is routed by its type through the
//! [`HandlerRegistry`] and run strictly in order; the batch either yields one
//! result per request, in order, or fails as a whole.
//!
//! Handlers can re-enter the dispatcher through the [`LoopbackHandle`] in
//! their [`DispatchContext`], issuing nested batches under the same caller
//! identity.
//!
//! This crate also provides a newline-delimited JSON transport over Unix
//! domain sockets ([`MuxServer`], [`MuxClient`]).

mod client;
mod connection;
mod context;
mod dispatcher;
mod error;
mod loopback;
mod registry;
mod server;

pub use client::MuxClient;
pub use connection::Connection;
pub use context::DispatchContext;
pub use dispatcher::{Dispatcher, DispatcherOptions, DEFAULT_MAX_LOOPBACK_DEPTH, DISPATCH_TARGET};
pub use error::{DispatchError, IpcError, IpcResult};
pub use loopback::LoopbackHandle;
pub use muxd_protocol_types::{
    error_codes, BatchRequest, BatchResponse, Call, ErrorDescriptor, ErrorKind, RequestEnvelope,
    ResultEntry,
};
pub use registry::{HandlerFn, HandlerFuture, HandlerRegistry, Resolution};
pub use server::{IdentifyFn, MuxServer, PeerIdentity};
