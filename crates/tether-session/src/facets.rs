//! Descriptor records carried as facets.
//!
//! These are opaque to the session core: the inbound, router and outbound
//! layers fill them in and read them back. The core only attaches and
//! extracts them.

use serde::{Deserialize, Serialize};

use crate::net::{Address, Destination};

/// Describes the listener and connection that accepted a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inbound {
    /// Remote peer of the accepted connection.
    pub source: Option<Destination>,
    /// Address the listener is bound to.
    pub gateway: Option<Destination>,
    /// Local end of the accepted connection.
    pub local: Option<Destination>,
    /// Tag of the inbound handler.
    pub tag: String,
    /// Protocol name of the inbound handler (e.g. `tunnel`).
    pub name: String,
    /// Authenticated user, if the inbound protocol has users.
    pub user: Option<String>,
}

/// Describes the outbound side of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Destination as requested by the client, before any sniffing override.
    pub original_target: Option<Destination>,
    /// Destination the outbound will connect to.
    pub target: Destination,
    /// Destination used for routing decisions when it differs from `target`.
    pub route_target: Option<Destination>,
    /// Source address used when dialing out.
    ///
    /// Rewritten at read time when an outbound-IP override is configured,
    /// see [`RoutingConfig`](crate::RoutingConfig).
    pub gateway: Option<Address>,
    /// Tag of the outbound handler chosen by the router.
    pub tag: String,
    /// Protocol name of the outbound handler (e.g. `freedom`).
    pub name: String,
}

impl Outbound {
    pub fn new(target: Destination) -> Self {
        Self {
            original_target: None,
            target,
            route_target: None,
            gateway: None,
            tag: String::new(),
            name: String::new(),
        }
    }

    pub fn with_gateway(mut self, gateway: impl Into<Address>) -> Self {
        self.gateway = Some(gateway.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

/// Socket tuning passed through to the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sockopt {
    /// `SO_MARK` value; zero means unset.
    #[serde(default)]
    pub mark: u32,
    /// Network interface to bind outgoing sockets to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
}
