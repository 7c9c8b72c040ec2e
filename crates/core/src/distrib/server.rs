//! Worker-side RPC server.

use std::net::SocketAddr;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::protocol::{dispatch, frame_codec, is_oversize_frame, RpcRequest, RpcResponse};
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

/// Bind `addr` and serve requests until `shutdown` fires.
pub async fn serve(engine: Engine, addr: SocketAddr, shutdown: CancellationToken) -> EngineResult<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| EngineError::io(addr, e))?;
    serve_listener(engine, listener, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve_listener(
    engine: Engine,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> EngineResult<()> {
    if let Ok(local) = listener.local_addr() {
        info!(addr = %local, "worker listening");
    }

    loop {
        let (stream, remote) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("worker shutting down");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            },
        };

        let engine = engine.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(engine, stream, remote, shutdown).await {
                warn!(remote = %remote, error = %e, "connection ended with error");
            }
        });
    }
}

async fn handle_connection(
    engine: Engine,
    stream: TcpStream,
    remote: SocketAddr,
    shutdown: CancellationToken,
) -> EngineResult<()> {
    debug!(remote = %remote, "connection opened");
    let max_frame = engine.config().rpc_max_frame_bytes;
    let mut framed = Framed::new(stream, frame_codec(max_frame));

    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            frame = framed.next() => frame,
        };
        let Some(frame) = frame else {
            debug!(remote = %remote, "connection closed");
            return Ok(());
        };
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) if is_oversize_frame(&e) => {
                warn!(remote = %remote, limit = max_frame, "request frame too large");
                let refusal = RpcResponse::from_result(Err(EngineError::Codec(format!(
                    "request frame exceeds the {max_frame} byte limit"
                ))));
                framed
                    .send(Bytes::from(refusal.encode()?))
                    .await
                    .map_err(|e| EngineError::io(remote, e))?;
                return Ok(());
            }
            Err(e) => return Err(EngineError::io(remote, e)),
        };

        let mut method = "undecodable";
        let response = match RpcRequest::decode(&frame) {
            Ok(request) => {
                method = request.method.name();
                debug!(remote = %remote, method, "request");
                let engine = engine.clone();
                let result = tokio::task::spawn_blocking(move || dispatch(&engine, request))
                    .await
                    .unwrap_or_else(|e| Err(EngineError::module(method, format!("handler panicked: {e}"))));
                RpcResponse::from_result(result)
            }
            Err(e) => RpcResponse::from_result(Err(e)),
        };

        let mut bytes = response.encode()?;
        if bytes.len() > max_frame {
            warn!(remote = %remote, method, size = bytes.len(), limit = max_frame, "reply too large");
            bytes = RpcResponse::from_result(Err(EngineError::Codec(format!(
                "{method} reply of {} bytes exceeds the {max_frame} byte frame limit",
                bytes.len()
            ))))
            .encode()?;
        }
        framed
            .send(Bytes::from(bytes))
            .await
            .map_err(|e| EngineError::io(remote, e))?;
    }
}
