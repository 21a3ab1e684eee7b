//! Built-in request handlers.
//!
//! Each module registers a small group of request types. Handlers are generic
//! over the caller identity so the same set runs under the socket transport
//! (`PeerIdentity`) and in tests.

pub mod batch;
pub mod health;
pub mod kv;

use std::fmt::Debug;

use muxd_dispatch::{DispatchError, HandlerRegistry};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

/// Register every built-in handler. No default handler is installed.
pub fn register_all<C>(
    registry: &mut HandlerRegistry<C>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DispatchError>
where
    C: Clone + Debug + Serialize + Send + Sync + 'static,
{
    health::register(registry, shutdown_tx)?;
    kv::register(registry, kv::KvStore::default())?;
    batch::register(registry)?;

    info!(count = registry.len(), "Registered built-in handlers");
    Ok(())
}
