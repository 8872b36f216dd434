//! # Login Protocol
//!
//! The account handshake: the first packet carries an asymmetric-key
//! envelope whose plaintext holds an action opcode, the four 32-bit words of
//! the symmetric session key, and the account credentials. Once the key is
//! installed every outbound packet on the connection is encrypted under it.
//!
//! Account verification and creation run on the logic executor; the network
//! reactor only parses. Results travel back as a single opcode byte, and
//! failure opcodes are followed by a graceful disconnect so the reply packet
//! still flushes before the socket closes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::context::GatewayContext;
use crate::core::message::NetworkMessage;
use crate::core::output::OutputMessage;
use crate::crypto::{CipherSuite, SessionCipher, SessionKey, ENVELOPE_LENGTH};
use crate::error::Result;
use crate::executor::LogicTask;
use crate::net::connection::Connection;
use crate::net::service::ServicePort;
use crate::protocol::Protocol;

/// Protocol identifier carried by the first byte of a login connection's
/// first packet.
pub const LOGIN_PROTOCOL_ID: u8 = 0x01;

/// Block size the session cipher operates on; outbound payloads are padded
/// to a multiple of this before encryption.
const CIPHER_BLOCK: usize = 8;

/// Padding byte appended by [`OutputMessage::pad_to_multiple`].
const CIPHER_PAD: u8 = 0x33;

/// Client actions and server results exchanged as single opcode bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoginOpcode {
    InvalidAccountName = 0x01,
    InvalidPassword = 0x02,
    LoginSuccess = 0x03,
    DoLogin = 0x04,
    CreateAccount = 0x05,
    UsernameAlreadyExists = 0x06,
    EmailAlreadyRegistered = 0x07,
    AccountCannotBeCreated = 0x08,
    CreateAccountSuccess = 0x09,
}

/// Account backend the login protocol consults. Runs on the logic executor;
/// implementations may block (database access).
pub trait AccountStore: Send + Sync {
    fn verify_account(&self, email: &str, password: &str) -> LoginOpcode;
    fn create_account(&self, username: &str, email: &str, password: &str) -> LoginOpcode;
}

struct LoginState {
    /// Dropped by `release` to break the connection↔protocol cycle.
    connection: Option<Arc<Connection>>,
    cipher: Option<Arc<dyn SessionCipher>>,
}

/// Login handshake protocol, one instance per connection.
pub struct LoginProtocol {
    ctx: GatewayContext,
    ciphers: Arc<dyn CipherSuite>,
    accounts: Arc<dyn AccountStore>,
    state: Mutex<LoginState>,
}

impl LoginProtocol {
    pub fn new(
        ctx: GatewayContext,
        ciphers: Arc<dyn CipherSuite>,
        accounts: Arc<dyn AccountStore>,
        connection: Arc<Connection>,
    ) -> Self {
        Self {
            ctx,
            ciphers,
            accounts,
            state: Mutex::new(LoginState { connection: Some(connection), cipher: None }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, LoginState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn disconnect(&self) {
        if let Some(connection) = self.lock_state().connection.clone() {
            connection.close(false);
        }
    }

    /// Decrypt the asymmetric envelope in place and check its zero marker
    /// byte. Returns false on any failure.
    fn decrypt_envelope(&self, msg: &mut NetworkMessage) -> bool {
        if msg.remaining() < ENVELOPE_LENGTH {
            return false;
        }
        let block = &mut msg.remaining_bytes_mut()[..ENVELOPE_LENGTH];
        if let Err(e) = self.ciphers.decrypt_envelope(block) {
            debug!(error = %e, "envelope decryption failed");
            return false;
        }
        matches!(msg.get_u8(), Ok(0))
    }
}

/// Send a one-byte result packet; anything but `success` also ends the
/// session, gracefully so the reply still flushes.
fn reply_opcode(connection: &Connection, opcode: LoginOpcode, success: LoginOpcode) {
    let mut output = OutputMessage::new();
    output.add_u8(opcode as u8);
    connection.send(output);

    if opcode != success {
        connection.close(false);
    }
}

impl Protocol for LoginProtocol {
    fn on_recv_first_message(&self, msg: &mut NetworkMessage) -> Result<()> {
        if !self.decrypt_envelope(msg) {
            self.disconnect();
            return Ok(());
        }

        let action = msg.get_u8()?;

        let key = SessionKey([msg.get_u32()?, msg.get_u32()?, msg.get_u32()?, msg.get_u32()?]);
        self.lock_state().cipher = Some(self.ciphers.session_cipher(key));

        // The job holds its own connection handle; the protocol itself stays
        // behind so the writer can keep encrypting replies.
        let Some(connection) = self.lock_state().connection.clone() else {
            return Ok(());
        };
        let accounts = Arc::clone(&self.accounts);

        if action == LoginOpcode::DoLogin as u8 {
            let email = msg.get_string()?;
            let password = msg.get_string()?;
            self.ctx.executor.submit(LogicTask::Job {
                name: "verify_account",
                run: Box::new(move || {
                    let opcode = accounts.verify_account(&email, &password);
                    reply_opcode(&connection, opcode, LoginOpcode::LoginSuccess);
                }),
            });
        } else if action == LoginOpcode::CreateAccount as u8 {
            let username = msg.get_string()?;
            let email = msg.get_string()?;
            let password = msg.get_string()?;
            self.ctx.executor.submit(LogicTask::Job {
                name: "create_account",
                run: Box::new(move || {
                    let opcode = accounts.create_account(&username, &email, &password);
                    reply_opcode(&connection, opcode, LoginOpcode::CreateAccountSuccess);
                }),
            });
        } else {
            trace!(action, "unknown login action ignored");
        }

        Ok(())
    }

    fn on_send_message(&self, msg: &mut OutputMessage) {
        let cipher = self.lock_state().cipher.clone();
        match cipher {
            Some(cipher) => {
                msg.write_message_length();
                msg.pad_to_multiple(CIPHER_BLOCK, CIPHER_PAD);
                cipher.encrypt(msg.contents_mut());
                msg.add_crypto_header(true);
            }
            None => msg.write_message_length(),
        }
    }

    fn release(&self) {
        // Only the connection reference is dropped; the session cipher must
        // survive so a failure reply still queued behind the release gets
        // encrypted on its way out.
        self.lock_state().connection = None;
    }
}

/// Service port multiplexing login connections: checks the protocol
/// identifier byte and requires a valid checksum on the first packet.
pub struct LoginServicePort {
    ctx: GatewayContext,
    ciphers: Arc<dyn CipherSuite>,
    accounts: Arc<dyn AccountStore>,
}

impl LoginServicePort {
    pub fn new(
        ctx: GatewayContext,
        ciphers: Arc<dyn CipherSuite>,
        accounts: Arc<dyn AccountStore>,
    ) -> Self {
        Self { ctx, ciphers, accounts }
    }
}

impl ServicePort for LoginServicePort {
    fn make_protocol(
        &self,
        checksum_ok: bool,
        msg: &mut NetworkMessage,
        connection: &Arc<Connection>,
    ) -> Option<Arc<dyn Protocol>> {
        if !checksum_ok {
            return None;
        }
        let id = msg.get_u8().ok()?;
        if id != LOGIN_PROTOCOL_ID {
            return None;
        }
        Some(Arc::new(LoginProtocol::new(
            self.ctx.clone(),
            Arc::clone(&self.ciphers),
            Arc::clone(&self.accounts),
            Arc::clone(connection),
        )))
    }
}
