//! Health, identity, echo and shutdown handlers.

use std::fmt::Debug;

use muxd_dispatch::{DispatchError, HandlerRegistry};
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::info;

/// Register health, whoami, echo and shutdown handlers.
pub fn register<C>(
    registry: &mut HandlerRegistry<C>,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<(), DispatchError>
where
    C: Clone + Debug + Serialize + Send + Sync + 'static,
{
    registry.register_handler("health", |ctx| async move {
        Ok(json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "depth": ctx.depth(),
        }))
    })?;

    registry.register_handler("whoami", |ctx| async move { Ok(json!(ctx.caller())) })?;

    registry.register_handler("echo", |ctx| async move { Ok(ctx.into_args()) })?;

    registry.register_handler("shutdown", move |_ctx| {
        let tx = shutdown_tx.clone();
        async move {
            info!("shutdown requested");
            let _ = tx.send(());
            Ok(json!({ "status": "shutting_down" }))
        }
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use muxd_dispatch::{Dispatcher, DispatcherOptions, RequestEnvelope};
    use serde_json::Value;

    fn dispatcher(shutdown_tx: broadcast::Sender<()>) -> Dispatcher<String> {
        let mut registry = HandlerRegistry::new();
        register(&mut registry, shutdown_tx).unwrap();
        Dispatcher::new(registry, DispatcherOptions::default())
    }

    #[tokio::test]
    async fn test_health_whoami_echo() {
        let (tx, _) = broadcast::channel(1);
        let dispatcher = dispatcher(tx);

        let results = dispatcher
            .process_batch(
                vec![
                    RequestEnvelope::new(1, "health", Value::Null),
                    RequestEnvelope::new(2, "whoami", json!({ "as": "someone-else" })),
                    RequestEnvelope::new(3, "echo", json!({ "nested": [true] })),
                ],
                "alice".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(results[0].payload["status"], "ok");
        assert_eq!(results[0].payload["depth"], 0);
        assert_eq!(results[1].payload, json!("alice"));
        assert_eq!(results[2].payload, json!({ "nested": [true] }));
    }

    #[tokio::test]
    async fn test_shutdown_signals_channel() {
        let (tx, mut rx) = broadcast::channel(1);
        let dispatcher = dispatcher(tx);

        let results = dispatcher
            .process_batch(
                vec![RequestEnvelope::new(1, "shutdown", Value::Null)],
                "alice".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(results[0].payload, json!({ "status": "shutting_down" }));
        assert!(rx.try_recv().is_ok());
    }
}
