//! # Logic Executor
//!
//! Single-threaded task queue for business-logic callbacks. Network reactor
//! threads never run account lookups or protocol teardown directly; they
//! submit a [`LogicTask`] and the dedicated logic thread drains the queue in
//! FIFO submission order.
//!
//! The reactor↔logic boundary is a typed channel rather than opaque bound
//! closures: the engine's own handoffs (`Connect`, `Release`) are dedicated
//! variants, and protocol-defined work travels as a named [`LogicTask::Job`]
//! so the boundary stays inspectable in logs.

use std::fmt;
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::trace;

use crate::protocol::Protocol;

/// A unit of work crossing from the reactor to the logic thread.
pub enum LogicTask {
    /// Run `Protocol::on_connect` for a protocol bound at accept time.
    Connect(Arc<dyn Protocol>),
    /// Run `Protocol::release`; always executed here, never on the reactor.
    Release(Arc<dyn Protocol>),
    /// Protocol-defined business logic.
    Job {
        name: &'static str,
        run: Box<dyn FnOnce() + Send>,
    },
}

impl LogicTask {
    fn name(&self) -> &'static str {
        match self {
            LogicTask::Connect(_) => "connect",
            LogicTask::Release(_) => "release",
            LogicTask::Job { name, .. } => name,
        }
    }
}

impl fmt::Debug for LogicTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LogicTask").field(&self.name()).finish()
    }
}

enum Command {
    Task(LogicTask),
    Stop,
}

/// Cloneable submission handle onto the logic thread's queue.
#[derive(Clone)]
pub struct LogicHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl LogicHandle {
    /// Fire-and-forget submission. Tasks submitted after shutdown are
    /// silently dropped; teardown during process exit must not panic the
    /// reactor.
    pub fn submit(&self, task: LogicTask) {
        if let Err(rejected) = self.tx.send(Command::Task(task)) {
            if let Command::Task(task) = rejected.0 {
                trace!(task = ?task, "logic executor stopped, dropping task");
            }
        }
    }
}

/// The logic thread itself. Owns the queue; dropping handles does not stop
/// it, calling [`LogicExecutor::shutdown`] does.
pub struct LogicExecutor {
    tx: mpsc::UnboundedSender<Command>,
    thread: Option<thread::JoinHandle<()>>,
}

impl LogicExecutor {
    /// Spawn the logic thread and return the executor.
    pub fn start() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();

        let thread = thread::spawn(move || {
            while let Some(command) = rx.blocking_recv() {
                match command {
                    Command::Task(task) => {
                        trace!(task = task.name(), "running logic task");
                        match task {
                            LogicTask::Connect(protocol) => protocol.on_connect(),
                            LogicTask::Release(protocol) => protocol.release(),
                            LogicTask::Job { run, .. } => run(),
                        }
                    }
                    Command::Stop => break,
                }
            }
        });

        Self { tx, thread: Some(thread) }
    }

    pub fn handle(&self) -> LogicHandle {
        LogicHandle { tx: self.tx.clone() }
    }

    /// Stop the logic thread and join it. Tasks submitted before the call
    /// still run; later submissions are dropped.
    pub fn shutdown(mut self) {
        let _ = self.tx.send(Command::Stop);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
