//! Unix domain socket transport.
//!
//! Each line a client writes is one JSON [`BatchRequest`]; the server answers
//! with one JSON [`BatchResponse`] line. Batches on the same connection are
//! processed one after another, while separate connections are served
//! concurrently.
//!
//! The caller identity for every batch on a connection is computed once,
//! when the connection is accepted, by the identity function the server was
//! built with. Nothing in the batch itself can influence it.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use muxd_protocol_types::{BatchRequest, BatchResponse, ErrorDescriptor};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{Dispatcher, IpcResult};

/// Computes the caller identity for a freshly accepted connection.
pub type IdentifyFn<C> = Arc<dyn Fn(&UnixStream) -> IpcResult<C> + Send + Sync>;

/// Identity derived from the peer's socket credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerIdentity {
    /// Effective user id of the peer process.
    pub uid: u32,
    /// Peer process id, where the platform reports it.
    pub pid: Option<i32>,
}

impl PeerIdentity {
    /// Read the peer credentials of `stream`.
    pub fn from_stream(stream: &UnixStream) -> IpcResult<Self> {
        let cred = stream.peer_cred()?;
        Ok(Self {
            uid: cred.uid(),
            pid: cred.pid(),
        })
    }
}

/// Batch server listening on a Unix domain socket.
pub struct MuxServer<C> {
    socket_path: PathBuf,
    dispatcher: Dispatcher<C>,
    identify: IdentifyFn<C>,
    shutdown_tx: broadcast::Sender<()>,
}

impl<C> MuxServer<C>
where
    C: Clone + Debug + Send + Sync + 'static,
{
    /// Create a server that tags each connection with `identify(stream)`.
    pub fn new<F>(socket_path: impl Into<PathBuf>, dispatcher: Dispatcher<C>, identify: F) -> Self
    where
        F: Fn(&UnixStream) -> IpcResult<C> + Send + Sync + 'static,
    {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            socket_path: socket_path.into(),
            dispatcher,
            identify: Arc::new(identify),
            shutdown_tx,
        }
    }

    /// Use an existing shutdown channel, e.g. one already handed to a
    /// `shutdown` handler.
    pub fn with_shutdown_sender(mut self, shutdown_tx: broadcast::Sender<()>) -> Self {
        self.shutdown_tx = shutdown_tx;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Get a shutdown receiver.
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Get a shutdown sender.
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Trigger shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Start the server and serve connections until shutdown.
    pub async fn run(&self) -> IpcResult<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        // Remove a stale socket left by a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }

        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!(path = %self.socket_path.display(), "batch server listening");

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _)) => self.spawn_connection(stream),
                        Err(e) => {
                            error!(error = %e, "Accept error");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("batch server shutting down");
                    break;
                }
            }
        }

        let _ = std::fs::remove_file(&self.socket_path);

        Ok(())
    }

    fn spawn_connection(&self, stream: UnixStream) {
        let caller = match (self.identify)(&stream) {
            Ok(caller) => caller,
            Err(e) => {
                warn!(error = %e, "Could not identify peer, dropping connection");
                return;
            }
        };

        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, dispatcher, caller).await {
                error!(error = %e, "Connection error");
            }
        });
    }
}

/// Serve batches from one client until it disconnects.
async fn handle_connection<C>(
    stream: UnixStream,
    dispatcher: Dispatcher<C>,
    caller: C,
) -> IpcResult<()>
where
    C: Clone + Debug + Send + Sync + 'static,
{
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    debug!(caller = ?caller, "Client connected");

    loop {
        line.clear();
        let bytes_read = reader.read_until(b'\n', &mut line).await?;

        if bytes_read == 0 {
            debug!("Client disconnected");
            break;
        }

        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }

        // Undecodable input, including bytes that are not UTF-8, is answered
        // on the same connection.
        let response = match BatchRequest::from_slice(trimmed) {
            Ok(batch) => dispatcher.respond(batch.requests, caller.clone()).await,
            Err(e) => {
                warn!(error = %e, bytes = trimmed.len(), "Failed to decode batch");
                BatchResponse::error(ErrorDescriptor::malformed(&e))
            }
        };

        if let Some(error) = response.error.as_ref() {
            debug!(kind = ?error.kind, code = error.code, "Rejecting batch");
        }

        write_line(&mut writer, &response.to_json()?).await?;
    }

    Ok(())
}

async fn write_line(writer: &mut OwnedWriteHalf, json: &str) -> IpcResult<()> {
    writer.write_all(json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
