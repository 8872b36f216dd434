//! # Packet Framing Codec
//!
//! [`PacketCodec`] splits the inbound byte stream into discrete packets:
//! a 2-byte little-endian header carries the body length (header excluded)
//! and exactly that many body bytes follow.
//!
//! The declared size is validated before any body byte is consumed. A header
//! declaring size 0 or ≥ `MAX_PACKET_SIZE - 16` is a protocol violation and
//! surfaces as [`GatewayError::InvalidHeader`], which the connection turns
//! into a force-close without ever issuing the body read.

use bytes::Buf;
use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::core::message::{NetworkMessage, HEADER_LENGTH, MAX_PACKET_SIZE};
use crate::error::GatewayError;

/// Upper bound (exclusive) on the declared body size.
pub const MAX_BODY_SIZE: usize = MAX_PACKET_SIZE - 16;

/// Decoder for the length-delimited packet stream.
#[derive(Debug, Default)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = NetworkMessage;
    type Error = GatewayError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<NetworkMessage>, GatewayError> {
        if src.len() < HEADER_LENGTH {
            return Ok(None);
        }

        let size = usize::from(u16::from_le_bytes([src[0], src[1]]));
        if size == 0 || size >= MAX_BODY_SIZE {
            return Err(GatewayError::InvalidHeader { size });
        }

        if src.len() < HEADER_LENGTH + size {
            src.reserve(HEADER_LENGTH + size - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LENGTH);
        Ok(Some(NetworkMessage::new(src.split_to(size))))
    }
}
