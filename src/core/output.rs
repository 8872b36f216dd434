//! # Outbound Packet Builder
//!
//! [`OutputMessage`] accumulates a payload and lets the owning protocol
//! prepend framing afterwards: the buffer reserves header room up front so
//! length and checksum fields grow downwards into it without shifting the
//! payload.
//!
//! Once handed to [`crate::net::Connection::send`] a message is queued
//! verbatim; the protocol's `on_send_message` hook applies encryption and the
//! final headers immediately before the bytes leave the process.

use crate::core::checksum::adler32;
use crate::core::message::{CHECKSUM_LENGTH, HEADER_LENGTH};

/// Room reserved for prepended framing: inner length, checksum, outer length.
const HEADER_ROOM: usize = HEADER_LENGTH + CHECKSUM_LENGTH + HEADER_LENGTH;

/// An outbound packet under construction.
#[derive(Debug, Clone)]
pub struct OutputMessage {
    buffer: Vec<u8>,
    /// Start of the written region; headers prepend by moving it down.
    header_position: usize,
}

impl Default for OutputMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputMessage {
    pub fn new() -> Self {
        Self { buffer: vec![0; HEADER_ROOM], header_position: HEADER_ROOM }
    }

    /// Length of the message as currently framed.
    pub fn len(&self) -> usize {
        self.buffer.len() - self.header_position
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn add_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Append a u16-length-prefixed string.
    pub fn add_string(&mut self, value: &str) {
        self.add_u16(value.len() as u16);
        self.buffer.extend_from_slice(value.as_bytes());
    }

    /// Append `fill` bytes until the framed length is a multiple of `block`.
    /// Returns the number of padding bytes added.
    pub fn pad_to_multiple(&mut self, block: usize, fill: u8) -> usize {
        let rem = self.len() % block;
        if rem == 0 {
            return 0;
        }
        let padding = block - rem;
        self.buffer.resize(self.buffer.len() + padding, fill);
        padding
    }

    fn prepend(&mut self, bytes: &[u8]) {
        debug_assert!(self.header_position >= bytes.len(), "header room exhausted");
        self.header_position -= bytes.len();
        let start = self.header_position;
        self.buffer[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Prepend a little-endian u16 length header covering everything framed
    /// so far.
    pub fn write_message_length(&mut self) {
        let length = self.len() as u16;
        self.prepend(&length.to_le_bytes());
    }

    /// Prepend the Adler-32 checksum of the framed content (when requested),
    /// then the outer length header covering checksum and content.
    pub fn add_crypto_header(&mut self, add_checksum: bool) {
        if add_checksum {
            let sum = adler32(&self.buffer[self.header_position..]);
            self.prepend(&sum.to_le_bytes());
        }
        self.write_message_length();
    }

    /// The framed wire bytes: any prepended headers followed by the payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[self.header_position..]
    }

    /// Mutable view of the framed region, for in-place payload encryption.
    pub fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[self.header_position..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::checksum::adler32;

    #[test]
    fn plain_length_header() {
        let mut msg = OutputMessage::new();
        msg.add_u8(0x03);
        msg.add_string("ok");
        msg.write_message_length();

        let bytes = msg.as_bytes();
        // 1 opcode + 2 length prefix + 2 string bytes = 5
        assert_eq!(bytes[..2], 5u16.to_le_bytes());
        assert_eq!(bytes[2], 0x03);
        assert_eq!(&bytes[5..], b"ok");
    }

    #[test]
    fn crypto_header_layout() {
        let mut msg = OutputMessage::new();
        msg.add_u32(0xAABB_CCDD);
        msg.write_message_length(); // inner length
        msg.pad_to_multiple(8, 0x33);
        msg.add_crypto_header(true);

        let bytes = msg.as_bytes();
        let outer = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        assert_eq!(outer, bytes.len() - 2);

        let sum = u32::from_le_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
        assert_eq!(sum, adler32(&bytes[6..]));

        // inner length (4) + payload (4) padded to the next 8-byte boundary
        assert_eq!(bytes.len() - 6, 8);
        assert_eq!(bytes[bytes.len() - 2..], [0x33, 0x33]);
    }

    #[test]
    fn pad_is_noop_on_aligned_content() {
        let mut msg = OutputMessage::new();
        msg.add_bytes(&[0u8; 16]);
        assert_eq!(msg.pad_to_multiple(8, 0x33), 0);
        assert_eq!(msg.len(), 16);
    }
}
