//! Distribution across worker processes.
//!
//! A worker is an ordinary engine serving [`RpcRequest`]s over TCP
//! ([`serve`]). The coordinator talks to workers through [`WorkerClient`]
//! and spreads map/reduce partitions with a [`WorkerPool`].

mod client;
mod pool;
mod protocol;
mod server;

pub use client::WorkerClient;
pub use pool::WorkerPool;
pub use protocol::{
    dispatch, frame_codec, RpcMethod, RpcReply, RpcRequest, RpcResponse, DEFAULT_MAX_FRAME_LENGTH,
};
pub use server::{serve, serve_listener};
