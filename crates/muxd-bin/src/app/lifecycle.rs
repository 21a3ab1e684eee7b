//! Daemon lifecycle: run, status, one-off calls.

use anyhow::Context;
use muxd_config_and_utils::{Config, Paths};
use muxd_dispatch::{
    Call, Connection, Dispatcher, DispatcherOptions, HandlerRegistry, IpcError, MuxClient,
    MuxServer, PeerIdentity,
};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::info;

use crate::handlers;

/// Build the dispatcher and serve the socket until shutdown.
pub async fn run_daemon(config: Config, paths: Paths) -> anyhow::Result<()> {
    paths.ensure_dirs()?;
    let socket_path = config.socket_path(&paths);

    let (shutdown_tx, _) = broadcast::channel(1);

    let mut registry = HandlerRegistry::<PeerIdentity>::new();
    handlers::register_all(&mut registry, shutdown_tx.clone())?;
    info!(types = ?registry.registered_types(), "handlers registered");

    let options = dispatcher_options(&config);
    let dispatcher = Dispatcher::new(registry, options);

    let server = MuxServer::new(&socket_path, dispatcher, PeerIdentity::from_stream)
        .with_shutdown_sender(shutdown_tx);

    let ctrl_c_tx = server.shutdown_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            let _ = ctrl_c_tx.send(());
        }
    });

    info!(
        socket = %socket_path.display(),
        max_loopback_depth = options.max_loopback_depth,
        "muxd starting"
    );
    server.run().await?;
    info!("muxd stopped");

    Ok(())
}

/// Dispatcher settings for `config`; anything unset keeps the dispatcher default.
fn dispatcher_options(config: &Config) -> DispatcherOptions {
    let mut options = DispatcherOptions::default();
    if let Some(depth) = config.max_loopback_depth {
        options.max_loopback_depth = depth;
    }
    options
}

/// Print whether the daemon is reachable.
pub async fn check_status(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    let socket_path = config.socket_path(paths);
    let client = MuxClient::new(&socket_path);

    match client.send(vec![Call::new("health", Value::Null)]).await {
        Ok(payloads) => {
            let health = payloads.into_iter().next().unwrap_or(Value::Null);
            println!("Daemon is running at {}", socket_path.display());
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        Err(IpcError::Socket(_)) => {
            println!("Daemon is not running (no socket at {})", socket_path.display());
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Send one request and print its payload.
pub async fn call(
    config: &Config,
    paths: &Paths,
    request_type: &str,
    args: Option<&str>,
) -> anyhow::Result<()> {
    let args: Value = match args {
        Some(raw) => serde_json::from_str(raw).context("arguments must be valid JSON")?,
        None => Value::Null,
    };

    let client = MuxClient::new(config.socket_path(paths));
    let payloads = client.send(vec![Call::new(request_type, args)]).await?;
    let payload = payloads.into_iter().next().unwrap_or(Value::Null);

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use muxd_dispatch::DEFAULT_MAX_LOOPBACK_DEPTH;

    #[test]
    fn test_dispatcher_options_default_depth() {
        let options = dispatcher_options(&Config::default());
        assert_eq!(options.max_loopback_depth, DEFAULT_MAX_LOOPBACK_DEPTH);
    }

    #[test]
    fn test_dispatcher_options_configured_depth() {
        let config = Config {
            max_loopback_depth: Some(3),
            ..Config::default()
        };
        assert_eq!(dispatcher_options(&config).max_loopback_depth, 3);
    }
}
