//! Adler-32 checksum over packet bodies.
//!
//! Lightweight integrity check carried in the 4 bytes immediately after the
//! length header. Receivers tolerate its absence, see
//! [`crate::core::message::NetworkMessage::verify_checksum`].

use crate::core::message::MAX_PACKET_SIZE;

const MOD_ADLER: u32 = 65521;

/// Largest number of bytes that can be summed before the accumulators must be
/// reduced to stay within u32.
const NMAX: usize = 5552;

/// Compute the Adler-32 checksum of `data`.
///
/// Returns 0 for inputs larger than [`MAX_PACKET_SIZE`]; no legitimate packet
/// body can be that large, and 0 is never a valid Adler-32 value.
pub fn adler32(data: &[u8]) -> u32 {
    if data.len() > MAX_PACKET_SIZE {
        return 0;
    }

    let mut a: u32 = 1;
    let mut b: u32 = 0;

    for chunk in data.chunks(NMAX) {
        for &byte in chunk {
            a += u32::from(byte);
            b += a;
        }
        a %= MOD_ADLER;
        b %= MOD_ADLER;
    }

    (b << 16) | a
}
