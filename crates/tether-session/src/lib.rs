//! Tether session: request-scoped metadata for the proxy pipeline.
//!
//! Every accepted connection gets a [`Session`] handle. Each stage of the
//! pipeline (inbound, sniffing, routing, outbound) derives a new handle by
//! attaching one facet and passes it on. This crate is the single source of
//! truth for the facet types, the propagation rules, the forced-outbound-tag
//! routing attribute, and the process-wide outbound-IP override.

pub mod config;
pub mod content;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod facets;
pub mod feedback;
pub mod id;
pub mod net;

pub use config::RoutingConfig;
pub use content::{Content, SniffingRequest, FORCED_OUTBOUND_TAG};
pub use context::Session;
pub use dispatch::{BoxStream, Dispatcher, DynDispatcher, ProxyStream};
pub use error::OutboundError;
pub use facets::{Inbound, Outbound, Sockopt};
pub use feedback::ErrorFeedback;
pub use id::SessionId;
pub use net::{Address, Destination, Network};
