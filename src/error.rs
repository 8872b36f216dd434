//! # Error Types
//!
//! Error handling for the gateway core.
//!
//! Socket-level failures are never propagated across the reactor: every I/O
//! error is caught at its call site inside the connection tasks and converted
//! into a force-close of that one connection. The variants here cover the
//! conditions that cross module boundaries: framing violations, malformed
//! payload reads inside protocol handlers, cryptographic collaborator
//! failures, and configuration problems.
//!
//! Checksum mismatch and rate-limit violations are deliberately *not* errors;
//! they are policy outcomes (cursor rewind, graceful disconnect) handled in
//! [`crate::net::connection`].

use std::io;
use thiserror::Error;

/// Primary error type for gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A length header declared a body size outside the accepted range.
    /// Always fatal for the connection; the body is never read.
    #[error("invalid packet header: declared body size {size}")]
    InvalidHeader { size: usize },

    /// A protocol handler tried to read past the end of a packet, or the
    /// packet contents did not decode (e.g. a non-UTF-8 string field).
    #[error("malformed packet")]
    MalformedPacket,

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Type alias for Results using GatewayError
pub type Result<T> = std::result::Result<T, GatewayError>;
