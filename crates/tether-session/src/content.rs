//! Content: the mutable attribute bag of a session.
//!
//! Content is the one facet that is mutated in place after it has been
//! attached. The handle holds it behind an `Arc`, so every handle derived
//! from the attach point sees the same bag and every write through any of
//! them is visible to all the others. A bag belongs to a single request; it
//! is never shared across requests.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Attribute key read by the router to force a specific outbound handler.
///
/// An absent or empty value means "no override".
pub const FORCED_OUTBOUND_TAG: &str = "forcedOutboundTag";

/// How the inbound asked for protocol sniffing to be applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SniffingRequest {
    pub enabled: bool,
    pub override_destination_for_protocol: Vec<String>,
    pub metadata_only: bool,
    pub route_only: bool,
}

#[derive(Debug, Default)]
struct ContentState {
    protocol: String,
    sniffing_request: SniffingRequest,
    // Created on the first `set_attribute`.
    attributes: Option<HashMap<String, String>>,
}

/// Classification data discovered about a request's payload.
#[derive(Debug, Default)]
pub struct Content {
    state: RwLock<ContentState>,
}

impl Content {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content pre-filled with a sniffing request.
    pub fn with_sniffing(request: SniffingRequest) -> Self {
        let content = Self::new();
        content.state.write().sniffing_request = request;
        content
    }

    /// Returns the value stored under `key`, if any.
    pub fn attribute(&self, key: &str) -> Option<String> {
        self.state
            .read()
            .attributes
            .as_ref()
            .and_then(|attrs| attrs.get(key).cloned())
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<String>) {
        self.state
            .write()
            .attributes
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
    }

    /// Snapshot of all attributes.
    pub fn attributes(&self) -> HashMap<String, String> {
        self.state.read().attributes.clone().unwrap_or_default()
    }

    /// Protocol name detected by sniffing; empty when unknown.
    pub fn protocol(&self) -> String {
        self.state.read().protocol.clone()
    }

    pub fn set_protocol(&self, protocol: impl Into<String>) {
        self.state.write().protocol = protocol.into();
    }

    pub fn sniffing_request(&self) -> SniffingRequest {
        self.state.read().sniffing_request.clone()
    }

    pub fn set_sniffing_request(&self, request: SniffingRequest) {
        self.state.write().sniffing_request = request;
    }
}
