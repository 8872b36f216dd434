//! # Cryptographic Seams
//!
//! The gateway does not implement cryptographic primitives; it defines the
//! points where they are invoked. A [`CipherSuite`] collaborator decrypts the
//! asymmetric login envelope and derives the per-session cipher from the
//! symmetric key the client supplies, and a [`SessionCipher`] transforms
//! packet contents in place once a session is established.
//!
//! Session state is scoped to the protocol instance that negotiated it; there
//! are no process-wide key registries.

use std::sync::Arc;

use crate::error::Result;

/// Length of the asymmetric-key envelope carried by the first login packet.
pub const ENVELOPE_LENGTH: usize = 128;

/// The four 32-bit words the login handshake exchanges as a symmetric
/// session key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionKey(pub [u32; 4]);

/// Symmetric cipher bound to one connection's session key.
///
/// `encrypt` operates on a whole framed region, which the caller has already
/// padded to the cipher's block size.
pub trait SessionCipher: Send + Sync {
    fn encrypt(&self, data: &mut [u8]);
    fn decrypt(&self, data: &mut [u8]) -> Result<()>;
}

/// Factory for the cryptographic operations the login handshake needs.
pub trait CipherSuite: Send + Sync {
    /// Decrypt an asymmetric-key envelope in place. Fails when the block is
    /// not a valid ciphertext for the configured private key.
    fn decrypt_envelope(&self, block: &mut [u8]) -> Result<()>;

    /// Derive the symmetric session cipher for `key`.
    fn session_cipher(&self, key: SessionKey) -> Arc<dyn SessionCipher>;
}
