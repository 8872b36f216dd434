//! # Connection Registry
//!
//! Process-wide set of live connections. One lock guards the map and is held
//! only for insertion, removal, and snapshotting, never across I/O.
//!
//! A registry entry is one of the strong references keeping a connection
//! alive; `release` drops it, and the connection is destroyed once its I/O
//! tasks let go of theirs.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::context::GatewayContext;
use crate::net::connection::Connection;
use crate::net::service::ServicePort;

/// Registry of live connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<u64, Arc<Connection>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Arc<Connection>>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate and register a new connection. Always succeeds; the caller
    /// starts I/O with [`Connection::accept`].
    pub fn create(
        &self,
        ctx: &GatewayContext,
        service_port: Arc<dyn ServicePort>,
        peer: Option<SocketAddr>,
    ) -> Arc<Connection> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let connection = Connection::new(id, ctx.clone(), service_port, peer);
        self.lock().insert(id, Arc::clone(&connection));
        connection
    }

    /// Remove a connection's entry. Removing an absent entry is a no-op.
    pub fn release(&self, id: u64) {
        self.lock().remove(&id);
    }

    /// Number of live (registered) connections.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Shut down every registered connection's socket, ignoring socket
    /// errors, and clear the set. For process shutdown only: the caller
    /// must have stopped accepting first.
    pub fn close_all(&self) {
        let snapshot: Vec<Arc<Connection>> = self.lock().values().cloned().collect();
        debug!(connections = snapshot.len(), "closing all connections");
        for connection in snapshot {
            connection.shutdown_socket();
        }
        self.lock().clear();
    }
}
