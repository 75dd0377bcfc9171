//! Relay service library crate.
//!
//! Exposes the configuration, the HTTP/WebSocket wiring, and the tracing
//! setup for use by the relay binary and integration tests.
pub mod config;
pub mod http;
pub mod observability;
