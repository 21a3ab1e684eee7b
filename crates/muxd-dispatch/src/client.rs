//! Client for the Unix socket transport.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use muxd_protocol_types::{BatchRequest, BatchResponse, Call, RequestEnvelope, ResultEntry};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::{Connection, IpcError, IpcResult};

/// Client that submits batches to a [`MuxServer`](crate::MuxServer).
///
/// Each call opens a fresh connection, sends one batch line and reads one
/// response line.
#[derive(Debug, Clone)]
pub struct MuxClient {
    socket_path: PathBuf,
}

impl MuxClient {
    /// Create a new client.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send a batch and wait for the raw response.
    pub async fn call(&self, batch: &BatchRequest) -> IpcResult<BatchResponse> {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| IpcError::Socket(format!("Failed to connect: {}", e)))?;

        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let batch_json = batch.to_json()?;
        writer.write_all(batch_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;

        let mut line = String::new();
        reader.read_line(&mut line).await?;

        if line.is_empty() {
            return Err(IpcError::ConnectionClosed);
        }

        Ok(BatchResponse::from_json(line.trim())?)
    }

    /// Send envelopes and return their results, or the rejection as
    /// [`IpcError::Rejected`].
    pub async fn send_batch(&self, requests: Vec<RequestEnvelope>) -> IpcResult<Vec<ResultEntry>> {
        self.call(&BatchRequest::new(requests))
            .await?
            .into_result()
            .map_err(IpcError::Rejected)
    }

    /// Check if the daemon answers a `health` request.
    pub async fn is_daemon_running(&self) -> bool {
        self.send(vec![Call::new("health", Value::Null)])
            .await
            .is_ok()
    }
}

#[async_trait]
impl Connection for MuxClient {
    type Error = IpcError;

    async fn send(&self, calls: Vec<Call>) -> Result<Vec<Value>, Self::Error> {
        let results = self
            .call(&BatchRequest::from_calls(calls))
            .await?
            .into_result()
            .map_err(IpcError::Rejected)?;

        Ok(results.into_iter().map(|entry| entry.payload).collect())
    }
}
