use std::net::SocketAddr;

use anyhow::{Context, Result};
use oxide_core::distrib::serve;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::Session;

/// Run a worker on `bind:port` until interrupted.
pub fn serve_command(session: &Session, bind: &str, port: Option<u16>) -> Result<()> {
    let port = port.unwrap_or(session.config.distributed_port);
    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .with_context(|| format!("Invalid listen address {bind}:{port}"))?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let shutdown = CancellationToken::new();
    let engine = session.engine.clone();
    println!("Serving {} on {addr}", session.layout.root.display());

    runtime.block_on(async move {
        let ctrl_c = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received");
                ctrl_c.cancel();
            }
        });
        serve(engine, addr, shutdown).await
    })?;
    Ok(())
}
