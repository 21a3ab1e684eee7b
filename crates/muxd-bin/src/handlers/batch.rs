//! `batch`: forwards an array of calls through the loopback.

use std::fmt::Debug;

use anyhow::Context;
use muxd_dispatch::{Call, DispatchError, HandlerRegistry};
use serde_json::Value;

/// Register the `batch` handler.
///
/// Its args are a JSON array of `{type, args}` calls; the result is the
/// array of their payloads. The nested batch runs under the same caller and
/// one loopback level deeper.
pub fn register<C>(registry: &mut HandlerRegistry<C>) -> Result<(), DispatchError>
where
    C: Clone + Debug + Send + Sync + 'static,
{
    registry.register_handler("batch", |ctx| async move {
        let calls: Vec<Call> = serde_json::from_value(ctx.args().clone())
            .context("batch expects an array of {type, args}")?;
        let payloads = ctx.loopback().send(calls).await?;
        Ok(Value::Array(payloads))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use muxd_dispatch::{Dispatcher, DispatcherOptions, ErrorKind, RequestEnvelope};
    use serde_json::json;

    fn dispatcher(max_loopback_depth: usize) -> Dispatcher<String> {
        let mut registry = HandlerRegistry::new();
        register(&mut registry).unwrap();
        registry
            .register_handler("whoami", |ctx| async move { Ok(json!(ctx.caller())) })
            .unwrap();
        Dispatcher::new(registry, DispatcherOptions { max_loopback_depth })
    }

    #[tokio::test]
    async fn test_batch_forwards_under_same_caller() {
        let dispatcher = dispatcher(4);

        let results = dispatcher
            .process_batch(
                vec![RequestEnvelope::new(
                    1,
                    "batch",
                    json!([
                        { "type": "whoami", "args": { "caller": "root" } },
                        { "type": "batch", "args": [{ "type": "whoami" }] },
                    ]),
                )],
                "alice".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(results[0].payload, json!(["alice", ["alice"]]));
    }

    #[tokio::test]
    async fn test_nested_batches_respect_depth_limit() {
        let dispatcher = dispatcher(1);

        let response = dispatcher
            .respond(
                vec![RequestEnvelope::new(
                    1,
                    "batch",
                    json!([{ "type": "batch", "args": [{ "type": "whoami" }] }]),
                )],
                "alice".to_string(),
            )
            .await;

        assert_eq!(response.error.unwrap().kind, ErrorKind::LoopbackDepthExceeded);
    }
}
