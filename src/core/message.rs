//! # Inbound Packet Buffer
//!
//! [`NetworkMessage`] wraps one framed packet body with a read cursor.
//! Protocol handlers consume it with little-endian getters; every read is
//! bounds-checked and returns [`GatewayError::MalformedPacket`] on overrun so
//! a truncated packet can only ever disconnect its own connection.
//!
//! The cursor can also move backwards: [`NetworkMessage::skip_bytes`] accepts
//! a negative count, which is how checksum verification restores the
//! pre-checksum position when the sender did not include one.

use bytes::BytesMut;

use crate::core::checksum::adler32;
use crate::error::{GatewayError, Result};

/// Maximum total packet size, header included.
pub const MAX_PACKET_SIZE: usize = 24590;

/// Length of the wire header: a little-endian u16 body length.
pub const HEADER_LENGTH: usize = 2;

/// Length of the optional Adler-32 checksum field at the start of the body.
pub const CHECKSUM_LENGTH: usize = 4;

/// One framed inbound packet body plus a read cursor.
#[derive(Debug)]
pub struct NetworkMessage {
    buffer: BytesMut,
    position: usize,
}

impl NetworkMessage {
    pub fn new(body: BytesMut) -> Self {
        Self { buffer: body, position: 0 }
    }

    /// Total body length, independent of the cursor.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Current cursor offset from the start of the body.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left between the cursor and the end of the body.
    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    fn ensure(&self, count: usize) -> Result<()> {
        if self.remaining() < count {
            return Err(GatewayError::MalformedPacket);
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let value = self.buffer[self.position];
        self.position += 1;
        Ok(value)
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        let bytes = [self.buffer[self.position], self.buffer[self.position + 1]];
        self.position += 2;
        Ok(u16::from_le_bytes(bytes))
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.buffer[self.position..self.position + 4]);
        self.position += 4;
        Ok(u32::from_le_bytes(bytes))
    }

    /// Read a u16-length-prefixed UTF-8 string.
    pub fn get_string(&mut self) -> Result<String> {
        let len = usize::from(self.get_u16()?);
        self.ensure(len)?;
        let bytes = &self.buffer[self.position..self.position + len];
        let value = std::str::from_utf8(bytes)
            .map_err(|_| GatewayError::MalformedPacket)?
            .to_owned();
        self.position += len;
        Ok(value)
    }

    /// Move the cursor by `count` bytes; negative values rewind.
    pub fn skip_bytes(&mut self, count: i32) -> Result<()> {
        if count >= 0 {
            self.ensure(count as usize)?;
            self.position += count as usize;
        } else {
            let back = count.unsigned_abs() as usize;
            if back > self.position {
                return Err(GatewayError::MalformedPacket);
            }
            self.position -= back;
        }
        Ok(())
    }

    /// The unread tail of the body.
    pub fn remaining_bytes(&self) -> &[u8] {
        &self.buffer[self.position..]
    }

    /// Mutable access to the unread tail, for in-place envelope decryption.
    pub fn remaining_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[self.position..]
    }

    /// Verify the leading 4-byte Adler-32 checksum field.
    ///
    /// The checksum covers the bytes that follow the field. On a match the
    /// cursor ends up past the field; on a mismatch the field is assumed to
    /// be payload (the sender chose not to include a checksum) and the cursor
    /// is rewound to where it started. Bodies too short to hold the field
    /// count as matching with both sides zero.
    ///
    /// Returns whether the checksum matched.
    pub fn verify_checksum(&mut self) -> bool {
        let computed = if self.remaining() > CHECKSUM_LENGTH {
            adler32(&self.buffer[self.position + CHECKSUM_LENGTH..])
        } else {
            0
        };

        if self.remaining() < CHECKSUM_LENGTH {
            // Nothing to read; a zero-length tail checksums to zero as well.
            return computed == 0;
        }

        let mut bytes = [0u8; CHECKSUM_LENGTH];
        bytes.copy_from_slice(&self.buffer[self.position..self.position + CHECKSUM_LENGTH]);
        let received = u32::from_le_bytes(bytes);
        self.position += CHECKSUM_LENGTH;

        if received != computed {
            // It might not have been a checksum, step back.
            self.position -= CHECKSUM_LENGTH;
            return false;
        }
        true
    }
}
