//! # Core Packet Components
//!
//! Low-level packet handling: framing, checksums, and the inbound/outbound
//! buffer types protocols read from and write into.
//!
//! ## Wire Format
//! ```text
//! [Length(2, LE)] [Checksum(4, optional)] [Payload(N)]
//! ```
//!
//! The length header counts the body only. The checksum is Adler-32 over the
//! payload; receivers fall back to checksum-less framing when it does not
//! match (the cursor is rewound, not rejected).

pub mod checksum;
pub mod codec;
pub mod message;
pub mod output;
