//! # Connection State Machine
//!
//! One [`Connection`] per accepted socket: it owns the packet framing, the
//! per-connection abuse limits, the bound protocol, and the ordered outbound
//! write queue. A connection is a small actor: a reader task and a writer
//! task are the only long-lived mutators, and everything they share sits
//! behind a single serialization lock that is never held across an `.await`.
//!
//! Deadline handling uses `tokio::time::timeout` wrapped around each read and
//! write future. A timer therefore cannot fire after its operation completed
//! and cannot keep a dead connection alive; the cancel-before-rearm dance of
//! callback-based reactors has no equivalent here.
//!
//! Close semantics: `state` moves `Open → Closed` exactly once, from any
//! thread. A force-close discards queued messages and tears the socket down
//! immediately; a graceful close lets the writer drain the queue first so an
//! already-queued error packet still reaches the client.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::time;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::context::GatewayContext;
use crate::core::codec::PacketCodec;
use crate::core::message::NetworkMessage;
use crate::core::output::OutputMessage;
use crate::executor::LogicTask;
use crate::net::service::ServicePort;
use crate::protocol::Protocol;

/// Convenience constant matching the spirit of `close(force: bool)` call
/// sites.
pub const FORCE_CLOSE: bool = true;

/// Connection lifecycle state. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closed,
}

/// Outcome of the per-packet rate bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RateLimit {
    Within,
    Exceeded,
}

/// What the writer found when it checked the queue.
enum WriterTurn {
    /// A dequeued message, now in flight.
    Write(OutputMessage),
    /// Closed with nothing left to write: perform the deferred shutdown.
    Drained,
    /// Open but empty; wait for a wakeup.
    Idle,
}

/// Mutable state shared between the reader task, the writer task, and
/// any-thread callers of `send`/`close`. Guarded by the connection's
/// serialization lock.
struct Inner {
    state: ConnectionState,
    queue: VecDeque<OutputMessage>,
    /// True while the writer holds a dequeued message it has not finished
    /// writing.
    in_flight: bool,
    protocol: Option<Arc<dyn Protocol>>,
    received_first: bool,
    packets_sent: u32,
    window_start: Instant,
}

impl Inner {
    /// Count one received packet against the rate window.
    ///
    /// `rate = packets_sent / max(1, elapsed_secs + 1)`; exceeding `cap`
    /// reports [`RateLimit::Exceeded`]. Once the window is older than two
    /// seconds the tracking restarts from `now`.
    fn register_packet(&mut self, now: Instant, cap: u32) -> RateLimit {
        let elapsed = now.saturating_duration_since(self.window_start).as_secs();
        let time_passed = elapsed.saturating_add(1).max(1);

        self.packets_sent = self.packets_sent.saturating_add(1);
        if u64::from(self.packets_sent) / time_passed > u64::from(cap) {
            return RateLimit::Exceeded;
        }

        if time_passed > 2 {
            self.window_start = now;
            self.packets_sent = 0;
        }
        RateLimit::Within
    }
}

/// Per-socket state machine; the unit of concurrency control.
pub struct Connection {
    id: u64,
    peer: Option<SocketAddr>,
    ctx: GatewayContext,
    service_port: Arc<dyn ServicePort>,
    inner: Mutex<Inner>,
    /// Wakes the writer when the queue gains an entry or the state changes.
    writer_wake: Notify,
    /// Trips when the socket must be torn down now; both tasks observe it.
    cancel: CancellationToken,
}

impl Connection {
    pub(crate) fn new(
        id: u64,
        ctx: GatewayContext,
        service_port: Arc<dyn ServicePort>,
        peer: Option<SocketAddr>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            peer,
            ctx,
            service_port,
            inner: Mutex::new(Inner {
                state: ConnectionState::Open,
                queue: VecDeque::new(),
                in_flight: false,
                protocol: None,
                received_first: false,
                packets_sent: 0,
                window_start: Instant::now(),
            }),
            writer_wake: Notify::new(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.lock_inner().state
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start serving the socket: spawns the reader and writer tasks.
    pub fn accept(self: &Arc<Self>, stream: TcpStream) {
        // Small packets dominate this workload.
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = stream.into_split();
        tokio::spawn(Arc::clone(self).read_loop(read_half));
        tokio::spawn(Arc::clone(self).write_loop(write_half));
    }

    /// Variant for protocols where the server sends first: the protocol is
    /// bound before any packet arrives and its `on_connect` runs on the
    /// logic executor.
    pub fn accept_with(self: &Arc<Self>, stream: TcpStream, protocol: Arc<dyn Protocol>) {
        self.lock_inner().protocol = Some(Arc::clone(&protocol));
        self.ctx.executor.submit(LogicTask::Connect(protocol));
        self.accept(stream);
    }

    /// Queue an outbound message. FIFO; at most one message is ever in
    /// flight, the rest wait their turn. No-op once the connection is
    /// closed. Callable from any thread.
    pub fn send(&self, msg: OutputMessage) {
        {
            let mut inner = self.lock_inner();
            if inner.state != ConnectionState::Open {
                return;
            }
            inner.queue.push_back(msg);
        }
        self.writer_wake.notify_one();
    }

    /// Close the connection. Callable from any thread; idempotent.
    ///
    /// Deregisters from the registry first, then transitions to `Closed`
    /// (at most once) and hands the bound protocol's `release` to the logic
    /// executor. With `force` the queue is discarded and the socket torn
    /// down immediately; otherwise the socket closes after the writer
    /// drains.
    pub fn close(&self, force: bool) {
        self.ctx.registry.release(self.id);

        let cancel_now = {
            let mut inner = self.lock_inner();
            if inner.state == ConnectionState::Closed {
                return;
            }
            inner.state = ConnectionState::Closed;

            if let Some(protocol) = inner.protocol.clone() {
                self.ctx.executor.submit(LogicTask::Release(protocol));
            }

            if force {
                inner.queue.clear();
            }
            force || (inner.queue.is_empty() && !inner.in_flight)
        };

        trace!(connection = self.id, force, "connection closed");
        if cancel_now {
            self.cancel.cancel();
        }
        self.writer_wake.notify_one();
    }

    /// Best-effort teardown used by `ConnectionRegistry::close_all` at
    /// process shutdown: mark closed and cut the socket without routing
    /// through the normal release path.
    pub(crate) fn shutdown_socket(&self) {
        {
            let mut inner = self.lock_inner();
            inner.state = ConnectionState::Closed;
            inner.queue.clear();
        }
        self.cancel.cancel();
        self.writer_wake.notify_one();
    }

    async fn read_loop(self: Arc<Self>, read_half: OwnedReadHalf) {
        let mut frames = FramedRead::new(read_half, PacketCodec);
        let read_timeout = self.ctx.config.network.read_timeout;

        loop {
            let mut msg = tokio::select! {
                () = self.cancel.cancelled() => return,
                next = time::timeout(read_timeout, frames.next()) => match next {
                    Err(_elapsed) => {
                        debug!(connection = self.id, peer = ?self.peer, "read timed out");
                        self.close(FORCE_CLOSE);
                        return;
                    }
                    Ok(None) => {
                        // Peer hung up.
                        self.close(FORCE_CLOSE);
                        return;
                    }
                    Ok(Some(Err(e))) => {
                        debug!(connection = self.id, peer = ?self.peer, error = %e, "read failed");
                        self.close(FORCE_CLOSE);
                        return;
                    }
                    Ok(Some(Ok(msg))) => msg,
                },
            };

            if !self.handle_message(&mut msg) {
                return;
            }
        }
    }

    /// Process one framed packet body: rate limit, checksum, protocol
    /// binding, dispatch. Returns whether the reader should keep going.
    fn handle_message(self: &Arc<Self>, msg: &mut NetworkMessage) -> bool {
        let cap = self.ctx.config.network.max_packets_per_second;
        {
            let mut inner = self.lock_inner();
            if inner.state != ConnectionState::Open {
                return false;
            }
            if inner.register_packet(Instant::now(), cap) == RateLimit::Exceeded {
                drop(inner);
                warn!(
                    connection = self.id,
                    peer = ?self.peer,
                    "disconnected for exceeding the packet-per-second limit"
                );
                // Graceful: any queued response still flushes.
                self.close(false);
                return false;
            }
        }

        let checksum_ok = msg.verify_checksum();

        let (first, bound) = {
            let mut inner = self.lock_inner();
            let first = !inner.received_first;
            inner.received_first = true;
            (first, inner.protocol.clone())
        };

        if first {
            let protocol = match bound {
                Some(protocol) => {
                    // The protocol identifier byte only matters on
                    // multiplexed ports; a pre-bound protocol skips it.
                    if msg.skip_bytes(1).is_err() {
                        self.close(FORCE_CLOSE);
                        return false;
                    }
                    protocol
                }
                None => {
                    match self.service_port.make_protocol(checksum_ok, msg, self) {
                        Some(made) => {
                            self.lock_inner().protocol = Some(Arc::clone(&made));
                            made
                        }
                        None => {
                            debug!(
                                connection = self.id,
                                peer = ?self.peer,
                                "no protocol accepted the first packet"
                            );
                            self.close(FORCE_CLOSE);
                            return false;
                        }
                    }
                }
            };

            if let Err(e) = protocol.on_recv_first_message(msg) {
                debug!(connection = self.id, error = %e, "first message rejected");
                self.close(FORCE_CLOSE);
                return false;
            }
        } else {
            let Some(protocol) = bound else {
                self.close(FORCE_CLOSE);
                return false;
            };
            if let Err(e) = protocol.on_recv_message(msg) {
                debug!(connection = self.id, error = %e, "message rejected");
                self.close(FORCE_CLOSE);
                return false;
            }
        }

        true
    }

    async fn write_loop(self: Arc<Self>, mut write_half: OwnedWriteHalf) {
        let write_timeout = self.ctx.config.network.write_timeout;

        loop {
            // Wait for the next queued message, or for the drained-and-closed
            // condition that performs a deferred shutdown. The queue check
            // runs in a scoped block so the guard is released before any
            // await point.
            let mut msg = loop {
                let turn = {
                    let mut inner = self.lock_inner();
                    match inner.queue.pop_front() {
                        Some(msg) => {
                            inner.in_flight = true;
                            WriterTurn::Write(msg)
                        }
                        None if inner.state == ConnectionState::Closed => WriterTurn::Drained,
                        None => WriterTurn::Idle,
                    }
                };

                match turn {
                    WriterTurn::Write(msg) => break msg,
                    WriterTurn::Drained => {
                        self.shutdown_write_half(&mut write_half).await;
                        return;
                    }
                    WriterTurn::Idle => tokio::select! {
                        () = self.cancel.cancelled() => {
                            self.shutdown_write_half(&mut write_half).await;
                            return;
                        }
                        () = self.writer_wake.notified() => {}
                    },
                }
            };

            // Encryption/signing point, immediately before the bytes leave
            // the process. The protocol handle is cloned out first; the
            // serialization lock must not be held while the hook runs.
            let protocol = self.lock_inner().protocol.clone();
            if let Some(protocol) = protocol {
                protocol.on_send_message(&mut msg);
            }

            // Biased so a force-close observed here never starts the write.
            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.shutdown_write_half(&mut write_half).await;
                    return;
                }
                result = time::timeout(write_timeout, write_half.write_all(msg.as_bytes())) => result,
            };

            let ok = matches!(result, Ok(Ok(())));
            {
                let mut inner = self.lock_inner();
                inner.in_flight = false;
                if !ok {
                    // No partial-queue retry: discard everything.
                    inner.queue.clear();
                }
            }

            if !ok {
                match &result {
                    Err(_elapsed) => {
                        debug!(connection = self.id, peer = ?self.peer, "write timed out");
                    }
                    Ok(Err(e)) => {
                        debug!(connection = self.id, peer = ?self.peer, error = %e, "write failed");
                    }
                    Ok(Ok(())) => {}
                }
                self.close(FORCE_CLOSE);
                self.shutdown_write_half(&mut write_half).await;
                return;
            }
        }
    }

    async fn shutdown_write_half(&self, write_half: &mut OwnedWriteHalf) {
        // Best effort; the peer may already be gone.
        let _ = time::timeout(Duration::from_secs(1), write_half.shutdown()).await;
        // Stop the reader too; with the write side gone the connection is
        // done.
        self.cancel.cancel();
    }
}
