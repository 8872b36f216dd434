//! # Service Port and Acceptor
//!
//! A [`ServicePort`] decides which application protocol handles a socket: on
//! a multiplexed listening port the first packet carries a protocol
//! identifier byte and the port's factory turns it into a bound protocol.
//!
//! [`serve`] is the accept loop: it registers each accepted socket with the
//! registry and hands it to a [`crate::net::Connection`]. Shutdown is
//! graceful: stop accepting, wait for live connections to drain up to the
//! configured timeout, then force-close whatever is left.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::context::GatewayContext;
use crate::core::message::NetworkMessage;
use crate::error::Result;
use crate::net::connection::Connection;
use crate::protocol::Protocol;

/// Factory mapping a first packet onto an application protocol.
pub trait ServicePort: Send + Sync {
    /// Inspect the first packet of a fresh connection and construct the
    /// protocol that will own it. `checksum_ok` reports whether the packet
    /// carried a valid Adler-32 checksum. Returning `None` rejects the
    /// connection (force-close).
    fn make_protocol(
        &self,
        checksum_ok: bool,
        msg: &mut NetworkMessage,
        connection: &Arc<Connection>,
    ) -> Option<Arc<dyn Protocol>>;
}

/// Accept connections on the configured bind address until `shutdown_rx`
/// fires, then drain and close.
pub async fn serve(
    ctx: GatewayContext,
    service_port: Arc<dyn ServicePort>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> Result<()> {
    let listener = TcpListener::bind(&ctx.config.network.bind_address).await?;
    info!(address = %ctx.config.network.bind_address, "listening");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("shutting down, waiting for connections to close");
                drain(&ctx).await;
                ctx.registry.close_all();
                return Ok(());
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    if ctx.registry.len() >= ctx.config.network.max_connections {
                        warn!(peer = %addr, "connection limit reached, rejecting");
                        drop(stream);
                        continue;
                    }
                    debug!(peer = %addr, "connection accepted");
                    let connection = ctx.registry.create(&ctx, Arc::clone(&service_port), Some(addr));
                    connection.accept(stream);
                }
                Err(e) => {
                    error!(error = %e, "error accepting connection");
                }
            }
        }
    }
}

/// Accept connections until CTRL+C.
pub async fn serve_until_ctrl_c(ctx: GatewayContext, service_port: Arc<dyn ServicePort>) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    serve(ctx, service_port, shutdown_rx).await
}

/// Wait for live connections to finish, bounded by the shutdown timeout.
async fn drain(ctx: &GatewayContext) {
    let deadline = tokio::time::sleep(ctx.config.network.shutdown_timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                warn!("shutdown timeout reached, forcing close");
                return;
            }
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                let open = ctx.registry.len();
                if open == 0 {
                    info!("all connections closed");
                    return;
                }
                info!(connections = %open, "waiting for connections to close");
            }
        }
    }
}
