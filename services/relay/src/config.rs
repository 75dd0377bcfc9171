use anyhow::{Context, Result};
use std::net::SocketAddr;

// Relay service configuration sourced from environment variables.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    // HTTP/WebSocket listener bind address.
    pub bind: SocketAddr,
    // Bounded mailbox depth for every subscriber.
    pub mailbox_capacity: usize,
}

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_MAILBOX_CAPACITY: usize = 10;

impl RelayConfig {
    pub fn from_env() -> Result<Self> {
        // Environment variables provide defaults for local development.
        let bind = std::env::var("RELAY_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string());
        let bind = bind
            .parse()
            .with_context(|| format!("parse RELAY_BIND value {bind}"))?;
        let mailbox_capacity = match std::env::var("RELAY_MAILBOX_CAPACITY") {
            Ok(value) => value
                .parse()
                .with_context(|| format!("parse RELAY_MAILBOX_CAPACITY value {value}"))?,
            Err(_) => DEFAULT_MAILBOX_CAPACITY,
        };
        Ok(Self {
            bind,
            mailbox_capacity,
        })
    }
}
