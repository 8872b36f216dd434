//! # Gateway Context
//!
//! Explicit dependency bundle passed into connection and protocol
//! construction. This replaces process-wide singletons (global dispatcher,
//! global config): the caller owns the lifetime of configuration, the logic
//! executor, and the connection registry, and tests substitute any of them
//! freely.

use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::executor::LogicHandle;
use crate::net::registry::ConnectionRegistry;

/// Shared services a connection or protocol needs.
#[derive(Clone)]
pub struct GatewayContext {
    pub config: Arc<GatewayConfig>,
    pub executor: LogicHandle,
    pub registry: Arc<ConnectionRegistry>,
}

impl GatewayContext {
    /// Bundle a config and executor handle with a fresh registry.
    pub fn new(config: GatewayConfig, executor: LogicHandle) -> Self {
        Self {
            config: Arc::new(config),
            executor,
            registry: Arc::new(ConnectionRegistry::new()),
        }
    }
}
