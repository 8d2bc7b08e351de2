//! Tether router: picks an outbound handler for each session and dials it.
//!
//! The router owns the outbound handlers, evaluates routing rules and
//! provides the [`Dispatcher`](tether_session::Dispatcher) implementation
//! that inbounds attach to their sessions.

pub mod config;
pub mod dispatcher;
pub mod outbound;
pub mod registry;
pub mod rules;

pub use config::{ConfigError, OutboundProtocol, OutboundSettings, RouterConfig};
pub use dispatcher::DefaultDispatcher;
pub use outbound::{Blackhole, Freedom, OutboundHandler, apply_sockopt};
pub use registry::OutboundManager;
pub use rules::{Router, RoutingRule};
