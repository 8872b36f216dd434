//! # Protocol Capability Interface
//!
//! A [`Protocol`] is the application-level half of a connection: the framing
//! engine hands it verified packet bodies and asks it to finalize outbound
//! messages. One concrete implementation exists per application protocol;
//! [`login::LoginProtocol`] handles the account handshake.
//!
//! Ownership: a protocol is owned by its connection for the connection's
//! lifetime. Protocols keep a reference back to their connection so they can
//! send and disconnect; `release` runs on the logic executor when the
//! connection closes and must drop that reference to break the cycle.

pub mod login;

use crate::core::message::NetworkMessage;
use crate::core::output::OutputMessage;
use crate::error::Result;

/// Application protocol bound to one connection.
///
/// `on_recv_first_message` and `on_recv_message` run on the reactor; an
/// `Err` from either force-closes the connection and nothing else.
/// `on_connect` and `release` always run on the logic executor.
pub trait Protocol: Send + Sync {
    /// Called once for server-sends-first protocols, before any packet
    /// arrives.
    fn on_connect(&self) {}

    /// First verified packet body of the connection.
    fn on_recv_first_message(&self, msg: &mut NetworkMessage) -> Result<()>;

    /// Every subsequent packet body.
    fn on_recv_message(&self, _msg: &mut NetworkMessage) -> Result<()> {
        Ok(())
    }

    /// Finalize an outbound message immediately before its bytes leave the
    /// process: the encryption/signing point. Implementations must leave the
    /// message fully framed (length header written).
    fn on_send_message(&self, msg: &mut OutputMessage);

    /// Connection teardown. Must drop any stored connection reference.
    /// Idempotent.
    fn release(&self) {}
}
