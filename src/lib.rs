//! # Gateway Protocol
//!
//! Asynchronous connection termination and packet framing for a multiplayer
//! login service: length-prefixed frames with an optional Adler-32 checksum,
//! per-connection rate limiting, an ordered single-flight write queue, and a
//! dedicated logic thread for account work.
//!
//! ## Architecture
//!
//! - [`net`]: the accept loop, the per-connection state machine, and the
//!   process-wide connection registry
//! - [`core`]: wire format (framing codec, inbound/outbound message
//!   buffers, Adler-32)
//! - [`protocol`]: the application seam and the login handshake
//! - [`executor`]: the single-threaded logic executor blocking work runs on
//! - [`crypto`]: cipher seams the login handshake is generic over
//! - [`config`]: TOML / environment configuration
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use gateway_protocol::config::GatewayConfig;
//! use gateway_protocol::context::GatewayContext;
//! use gateway_protocol::executor::LogicExecutor;
//! use gateway_protocol::net::serve_until_ctrl_c;
//! use gateway_protocol::protocol::login::LoginServicePort;
//! # use gateway_protocol::crypto::CipherSuite;
//! # use gateway_protocol::protocol::login::AccountStore;
//! # async fn run(ciphers: Arc<dyn CipherSuite>, accounts: Arc<dyn AccountStore>)
//! #     -> gateway_protocol::error::Result<()> {
//! let config = GatewayConfig::from_env()?;
//! config.validate_strict()?;
//!
//! let executor = LogicExecutor::start();
//! let ctx = GatewayContext::new(config, executor.handle());
//!
//! let port = Arc::new(LoginServicePort::new(ctx.clone(), ciphers, accounts));
//! serve_until_ctrl_c(ctx, port).await?;
//! executor.shutdown();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod core;
pub mod crypto;
pub mod error;
pub mod executor;
pub mod net;
pub mod protocol;

pub use config::GatewayConfig;
pub use context::GatewayContext;
pub use crate::core::message::{NetworkMessage, MAX_PACKET_SIZE};
pub use crate::core::output::OutputMessage;
pub use error::{GatewayError, Result};
pub use executor::{LogicExecutor, LogicHandle, LogicTask};
pub use net::{Connection, ConnectionRegistry, ConnectionState, ServicePort};
pub use protocol::Protocol;
