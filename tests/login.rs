//! Integration tests for the login handshake: envelope handling, session
//! cipher installation, account verification outcomes, and the encrypted
//! reply framing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use gateway_protocol::config::GatewayConfig;
use gateway_protocol::context::GatewayContext;
use gateway_protocol::core::checksum::adler32;
use gateway_protocol::crypto::{CipherSuite, SessionCipher, SessionKey, ENVELOPE_LENGTH};
use gateway_protocol::error::Result;
use gateway_protocol::executor::LogicExecutor;
use gateway_protocol::net::ServicePort;
use gateway_protocol::protocol::login::{AccountStore, LoginOpcode, LoginServicePort};

const XOR_MASK: u8 = 0x5A;

/// Stand-in suite: the envelope is accepted as-is and the session cipher
/// XORs every byte, enough to prove encryption is applied at the send hook.
struct XorSuite;

struct XorCipher;

impl SessionCipher for XorCipher {
    fn encrypt(&self, data: &mut [u8]) {
        for b in data {
            *b ^= XOR_MASK;
        }
    }

    fn decrypt(&self, data: &mut [u8]) -> Result<()> {
        self.encrypt(data);
        Ok(())
    }
}

impl CipherSuite for XorSuite {
    fn decrypt_envelope(&self, _block: &mut [u8]) -> Result<()> {
        Ok(())
    }

    fn session_cipher(&self, _key: SessionKey) -> Arc<dyn SessionCipher> {
        Arc::new(XorCipher)
    }
}

/// In-memory account backend.
#[derive(Default)]
struct MemoryAccounts {
    by_email: Mutex<HashMap<String, (String, String)>>, // email -> (username, password)
}

impl MemoryAccounts {
    fn with_account(username: &str, email: &str, password: &str) -> Self {
        let accounts = Self::default();
        accounts
            .by_email
            .lock()
            .unwrap()
            .insert(email.to_owned(), (username.to_owned(), password.to_owned()));
        accounts
    }
}

impl AccountStore for MemoryAccounts {
    fn verify_account(&self, email: &str, password: &str) -> LoginOpcode {
        match self.by_email.lock().unwrap().get(email) {
            None => LoginOpcode::InvalidAccountName,
            Some((_, stored)) if stored != password => LoginOpcode::InvalidPassword,
            Some(_) => LoginOpcode::LoginSuccess,
        }
    }

    fn create_account(&self, username: &str, email: &str, password: &str) -> LoginOpcode {
        if username.is_empty() || password.is_empty() {
            return LoginOpcode::AccountCannotBeCreated;
        }
        let mut accounts = self.by_email.lock().unwrap();
        if accounts.values().any(|(existing, _)| existing == username) {
            return LoginOpcode::UsernameAlreadyExists;
        }
        if accounts.contains_key(email) {
            return LoginOpcode::EmailAlreadyRegistered;
        }
        accounts.insert(email.to_owned(), (username.to_owned(), password.to_owned()));
        LoginOpcode::CreateAccountSuccess
    }
}

struct Harness {
    ctx: GatewayContext,
    executor: LogicExecutor,
    listener: TcpListener,
    port: Arc<LoginServicePort>,
}

impl Harness {
    async fn start(accounts: MemoryAccounts) -> Self {
        let executor = LogicExecutor::start();
        let ctx = GatewayContext::new(GatewayConfig::default(), executor.handle());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = Arc::new(LoginServicePort::new(
            ctx.clone(),
            Arc::new(XorSuite),
            Arc::new(accounts),
        ));
        Self { ctx, executor, listener, port }
    }

    async fn connect(&self) -> TcpStream {
        let client = TcpStream::connect(self.listener.local_addr().unwrap()).await.unwrap();
        let (stream, addr) = self.listener.accept().await.unwrap();
        let connection = self.ctx.registry.create(
            &self.ctx,
            Arc::clone(&self.port) as Arc<dyn ServicePort>,
            Some(addr),
        );
        connection.accept(stream);
        client
    }

    fn finish(self) {
        self.executor.shutdown();
    }
}

fn push_string(out: &mut Vec<u8>, value: &str) {
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(value.as_bytes());
}

/// Build the plaintext login envelope: zero marker, action byte, the four
/// session-key words, then the credential strings, zero-filled to 128 bytes.
fn envelope(action: u8, strings: &[&str]) -> Vec<u8> {
    let mut env = vec![0u8]; // marker
    env.push(action);
    for word in [0x1111_1111u32, 0x2222_2222, 0x3333_3333, 0x4444_4444] {
        env.extend_from_slice(&word.to_le_bytes());
    }
    for s in strings {
        push_string(&mut env, s);
    }
    assert!(env.len() <= ENVELOPE_LENGTH, "envelope payload too large for test");
    env.resize(ENVELOPE_LENGTH, 0);
    env
}

/// First packet on the wire: length header, checksum, protocol id, envelope.
fn first_packet(envelope: &[u8]) -> Vec<u8> {
    let mut body = vec![0x01]; // login protocol id
    body.extend_from_slice(envelope);

    let mut checksummed = adler32(&body).to_le_bytes().to_vec();
    checksummed.extend_from_slice(&body);

    let mut wire = (checksummed.len() as u16).to_le_bytes().to_vec();
    wire.extend_from_slice(&checksummed);
    wire
}

/// Read and unwrap one encrypted reply: outer length, checksum, XOR layer,
/// inner length. Returns the inner payload (opcode plus whatever follows).
async fn read_encrypted_reply(client: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 2];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut header))
        .await
        .expect("timed out waiting for a reply")
        .unwrap();
    let mut body = vec![0u8; u16::from_le_bytes(header) as usize];
    client.read_exact(&mut body).await.unwrap();

    let received = u32::from_le_bytes([body[0], body[1], body[2], body[3]]);
    assert_eq!(received, adler32(&body[4..]), "reply checksum must cover the encrypted region");

    let encrypted = &mut body[4..];
    assert_eq!(encrypted.len() % 8, 0, "encrypted region must be block-aligned");
    for b in encrypted.iter_mut() {
        *b ^= XOR_MASK;
    }

    let inner_len = u16::from_le_bytes([encrypted[0], encrypted[1]]) as usize;
    encrypted[2..2 + inner_len].to_vec()
}

async fn expect_eof(client: &mut TcpStream) {
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut rest))
        .await
        .expect("timed out waiting for EOF")
        .unwrap();
    assert_eq!(rest, Vec::<u8>::new());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn successful_login_gets_an_encrypted_success_opcode() {
    let h = Harness::start(MemoryAccounts::with_account("rook", "rook@example.com", "hunter2"))
        .await;
    let mut client = h.connect().await;

    let env = envelope(LoginOpcode::DoLogin as u8, &["rook@example.com", "hunter2"]);
    client.write_all(&first_packet(&env)).await.unwrap();

    let reply = read_encrypted_reply(&mut client).await;
    assert_eq!(reply, [LoginOpcode::LoginSuccess as u8]);
    h.finish();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wrong_password_replies_then_disconnects() {
    let h = Harness::start(MemoryAccounts::with_account("rook", "rook@example.com", "hunter2"))
        .await;
    let mut client = h.connect().await;

    let env = envelope(LoginOpcode::DoLogin as u8, &["rook@example.com", "wrong"]);
    client.write_all(&first_packet(&env)).await.unwrap();

    let reply = read_encrypted_reply(&mut client).await;
    assert_eq!(reply, [LoginOpcode::InvalidPassword as u8]);
    expect_eof(&mut client).await;
    assert!(h.ctx.registry.is_empty());
    h.finish();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unknown_account_replies_invalid_account_name() {
    let h = Harness::start(MemoryAccounts::default()).await;
    let mut client = h.connect().await;

    let env = envelope(LoginOpcode::DoLogin as u8, &["ghost@example.com", "pw"]);
    client.write_all(&first_packet(&env)).await.unwrap();

    let reply = read_encrypted_reply(&mut client).await;
    assert_eq!(reply, [LoginOpcode::InvalidAccountName as u8]);
    expect_eof(&mut client).await;
    h.finish();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn account_creation_succeeds_then_duplicate_is_rejected() {
    let h = Harness::start(MemoryAccounts::default()).await;

    let mut first = h.connect().await;
    let env = envelope(LoginOpcode::CreateAccount as u8, &["rook", "rook@example.com", "pw"]);
    first.write_all(&first_packet(&env)).await.unwrap();
    let reply = read_encrypted_reply(&mut first).await;
    assert_eq!(reply, [LoginOpcode::CreateAccountSuccess as u8]);

    let mut second = h.connect().await;
    let env = envelope(LoginOpcode::CreateAccount as u8, &["rook", "other@example.com", "pw"]);
    second.write_all(&first_packet(&env)).await.unwrap();
    let reply = read_encrypted_reply(&mut second).await;
    assert_eq!(reply, [LoginOpcode::UsernameAlreadyExists as u8]);
    expect_eof(&mut second).await;
    h.finish();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_email_is_rejected() {
    let h = Harness::start(MemoryAccounts::with_account("rook", "rook@example.com", "pw")).await;
    let mut client = h.connect().await;

    let env = envelope(LoginOpcode::CreateAccount as u8, &["knight", "rook@example.com", "pw"]);
    client.write_all(&first_packet(&env)).await.unwrap();

    let reply = read_encrypted_reply(&mut client).await;
    assert_eq!(reply, [LoginOpcode::EmailAlreadyRegistered as u8]);
    expect_eof(&mut client).await;
    h.finish();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn short_envelope_disconnects_without_a_reply() {
    let h = Harness::start(MemoryAccounts::default()).await;
    let mut client = h.connect().await;

    // Well-formed frame and checksum, but the envelope is truncated.
    let mut body = vec![0x01];
    body.extend_from_slice(&[0u8; 32]);
    let mut checksummed = adler32(&body).to_le_bytes().to_vec();
    checksummed.extend_from_slice(&body);
    let mut wire = (checksummed.len() as u16).to_le_bytes().to_vec();
    wire.extend_from_slice(&checksummed);
    client.write_all(&wire).await.unwrap();

    expect_eof(&mut client).await;
    assert!(h.ctx.registry.is_empty());
    h.finish();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn missing_checksum_rejects_the_connection() {
    let h = Harness::start(MemoryAccounts::default()).await;
    let mut client = h.connect().await;

    // Login requires a valid checksum on the first packet.
    let env = envelope(LoginOpcode::DoLogin as u8, &["rook@example.com", "pw"]);
    let mut body = vec![0x01];
    body.extend_from_slice(&env);
    let mut wire = (body.len() as u16).to_le_bytes().to_vec();
    wire.extend_from_slice(&body);
    client.write_all(&wire).await.unwrap();

    expect_eof(&mut client).await;
    h.finish();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn wrong_protocol_id_rejects_the_connection() {
    let h = Harness::start(MemoryAccounts::default()).await;
    let mut client = h.connect().await;

    let env = envelope(LoginOpcode::DoLogin as u8, &["rook@example.com", "pw"]);
    let mut body = vec![0x7F]; // not the login id
    body.extend_from_slice(&env);
    let mut checksummed = adler32(&body).to_le_bytes().to_vec();
    checksummed.extend_from_slice(&body);
    let mut wire = (checksummed.len() as u16).to_le_bytes().to_vec();
    wire.extend_from_slice(&checksummed);
    client.write_all(&wire).await.unwrap();

    expect_eof(&mut client).await;
    h.finish();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unknown_action_is_ignored() {
    let h = Harness::start(MemoryAccounts::default()).await;
    let mut client = h.connect().await;

    let env = envelope(0x7E, &[]);
    client.write_all(&first_packet(&env)).await.unwrap();

    // No reply and no disconnect; the connection idles until its deadline.
    let mut probe = [0u8; 1];
    let outcome =
        tokio::time::timeout(Duration::from_millis(300), client.read_exact(&mut probe)).await;
    assert!(outcome.is_err(), "nothing should arrive for an unknown action");
    assert_eq!(h.ctx.registry.len(), 1);
    h.finish();
}
