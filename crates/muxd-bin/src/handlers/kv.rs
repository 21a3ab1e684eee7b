//! In-memory key/value handlers.
//!
//! `kv.swap` is built entirely from `kv.get` and `kv.set` issued through the
//! loopback, so it goes through the same routing as external requests.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Context;
use muxd_dispatch::{Call, DispatchError, HandlerRegistry};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;

/// Shared store, alive for the whole process.
#[derive(Debug, Clone, Default)]
pub struct KvStore {
    entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl KvStore {
    /// Store `value`, returning the previous value.
    pub async fn set(&self, key: String, value: Value) -> Option<Value> {
        self.entries.write().await.insert(key, value)
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.entries.read().await.get(key).cloned()
    }
}

#[derive(Debug, Deserialize)]
struct SetArgs {
    key: String,
    value: Value,
}

#[derive(Debug, Deserialize)]
struct GetArgs {
    key: String,
}

#[derive(Debug, Deserialize)]
struct SwapArgs {
    a: String,
    b: String,
}

/// Register `kv.set`, `kv.get` and `kv.swap`.
pub fn register<C>(registry: &mut HandlerRegistry<C>, store: KvStore) -> Result<(), DispatchError>
where
    C: Clone + Debug + Send + Sync + 'static,
{
    let set_store = store.clone();
    registry.register_handler("kv.set", move |ctx| {
        let store = set_store.clone();
        async move {
            let args: SetArgs =
                serde_json::from_value(ctx.into_args()).context("kv.set expects {key, value}")?;
            let previous = store.set(args.key, args.value).await;
            Ok(previous.unwrap_or(Value::Null))
        }
    })?;

    registry.register_handler("kv.get", move |ctx| {
        let store = store.clone();
        async move {
            let args: GetArgs =
                serde_json::from_value(ctx.into_args()).context("kv.get expects {key}")?;
            Ok(store.get(&args.key).await.unwrap_or(Value::Null))
        }
    })?;

    registry.register_handler("kv.swap", |ctx| async move {
        let args: SwapArgs =
            serde_json::from_value(ctx.args().clone()).context("kv.swap expects {a, b}")?;
        let loopback = ctx.loopback();

        let current = loopback
            .send(vec![
                Call::new("kv.get", json!({ "key": args.a })),
                Call::new("kv.get", json!({ "key": args.b })),
            ])
            .await?;
        let (value_a, value_b) = (current[0].clone(), current[1].clone());

        loopback
            .send(vec![
                Call::new("kv.set", json!({ "key": args.a, "value": value_b })),
                Call::new("kv.set", json!({ "key": args.b, "value": value_a })),
            ])
            .await?;

        Ok(json!({ args.a: value_b, args.b: value_a }))
    })?;

    Ok(())
}
