//! # Connection Termination Layer
//!
//! Everything between the accepted socket and the application protocol:
//! the per-connection state machine, the process-wide registry, and the
//! service-port acceptor glue.

pub mod connection;
pub mod registry;
pub mod service;

pub use connection::{Connection, ConnectionState, FORCE_CLOSE};
pub use registry::ConnectionRegistry;
pub use service::{serve, serve_until_ctrl_c, ServicePort};
