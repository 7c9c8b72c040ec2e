//! Coordinator-side RPC client.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use super::protocol::{
    frame_codec, is_oversize_frame, RpcMethod, RpcReply, RpcRequest, RpcResponse, DEFAULT_MAX_FRAME_LENGTH,
};
use crate::error::{EngineError, EngineResult};

/// One request per connection to a single worker endpoint.
#[derive(Debug, Clone)]
pub struct WorkerClient {
    endpoint: String,
    timeout: Duration,
    max_frame_length: usize,
}

impl WorkerClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self { endpoint: endpoint.into(), timeout, max_frame_length: DEFAULT_MAX_FRAME_LENGTH }
    }

    pub fn with_max_frame_length(mut self, max_frame_length: usize) -> Self {
        self.max_frame_length = max_frame_length;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send `method` and wait for the reply. Transport failures and timeouts
    /// are `WorkerUnavailable`; frames over the length cap are `Codec`; errors
    /// raised by the worker are `Remote`.
    pub async fn call(&self, method: RpcMethod) -> EngineResult<RpcReply> {
        let name = method.name();
        let request = RpcRequest::new(method).encode()?;
        if request.len() > self.max_frame_length {
            return Err(EngineError::Codec(format!(
                "{name} request of {} bytes exceeds the {} byte frame limit for {}",
                request.len(),
                self.max_frame_length,
                self.endpoint
            )));
        }
        let response = tokio::time::timeout(self.timeout, self.round_trip(request))
            .await
            .map_err(|_| self.unavailable(format!("{name} timed out after {:?}", self.timeout)))??;
        debug!(endpoint = %self.endpoint, method = name, "reply received");

        response.result.map_err(|message| EngineError::Remote {
            endpoint: self.endpoint.clone(),
            message,
        })
    }

    pub async fn alive(&self) -> bool {
        matches!(self.call(RpcMethod::Alive).await, Ok(RpcReply::Alive(true)))
    }

    async fn round_trip(&self, request: Vec<u8>) -> EngineResult<RpcResponse> {
        let stream = TcpStream::connect(&self.endpoint)
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;
        let mut framed = Framed::new(stream, frame_codec(self.max_frame_length));
        framed
            .send(Bytes::from(request))
            .await
            .map_err(|e| self.transport_error(e))?;
        let frame = framed
            .next()
            .await
            .ok_or_else(|| self.unavailable("connection closed before reply"))?
            .map_err(|e| self.transport_error(e))?;
        RpcResponse::decode(&frame)
    }

    fn transport_error(&self, err: io::Error) -> EngineError {
        if is_oversize_frame(&err) {
            EngineError::Codec(format!("{}: {err} (limit {} bytes)", self.endpoint, self.max_frame_length))
        } else {
            self.unavailable(err.to_string())
        }
    }

    fn unavailable(&self, reason: impl Into<String>) -> EngineError {
        EngineError::WorkerUnavailable { endpoint: self.endpoint.clone(), reason: reason.into() }
    }
}
