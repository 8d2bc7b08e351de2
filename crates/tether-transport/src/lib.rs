//! Tether Transport Layer
//!
//! Accepts TCP connections and turns each one into a proxied request.
//! The transport layer handles:
//! - Connection lifecycle (accept, relay, close)
//! - Building the base session for each connection
//! - Collecting outbound failures reported back through the session
//!
//! The transport is decoupled from routing via the `Dispatcher` capability
//! it attaches to every session.

pub mod client;
pub mod server;

pub use client::ClientConnection;
pub use server::{InboundConfig, InboundListener};
