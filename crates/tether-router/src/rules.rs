//! Routing rules: choose an outbound tag for a session.
//!
//! Evaluation order:
//! 1. a non-empty forced outbound tag on the session wins outright;
//! 2. otherwise the first matching rule, in configuration order;
//! 3. otherwise the caller's default.

use std::net::IpAddr;

use serde::Deserialize;
use tether_session::{Destination, Session};

/// One routing rule. Every non-empty condition must match; a rule with no
/// conditions matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRule {
    /// Destination domain suffixes (`example.com` also matches `a.example.com`).
    #[serde(default)]
    pub domain_suffix: Vec<String>,
    /// Destination IPs.
    #[serde(default)]
    pub ip: Vec<IpAddr>,
    /// Destination ports.
    #[serde(default)]
    pub port: Vec<u16>,
    /// Source IPs of the inbound connection. Pointing the outbound-IP
    /// override here catches the proxy's own traffic looping back in.
    #[serde(default)]
    pub source_ip: Vec<IpAddr>,
    /// Tags of the inbound that accepted the connection.
    #[serde(default)]
    pub inbound_tag: Vec<String>,
    /// Outbound to use when the rule matches.
    pub outbound_tag: String,
}

impl RoutingRule {
    pub fn to(outbound_tag: impl Into<String>) -> Self {
        Self {
            outbound_tag: outbound_tag.into(),
            ..Default::default()
        }
    }

    pub fn matches(&self, session: &Session, destination: &Destination) -> bool {
        if !self.domain_suffix.is_empty() {
            let Some(domain) = destination.address.domain() else {
                return false;
            };
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            let hit = self.domain_suffix.iter().any(|suffix| {
                let suffix = suffix.to_ascii_lowercase();
                domain == suffix || domain.ends_with(&format!(".{suffix}"))
            });
            if !hit {
                return false;
            }
        }

        if !self.ip.is_empty() {
            match destination.address.ip() {
                Some(ip) if self.ip.contains(&ip) => {}
                _ => return false,
            }
        }

        if !self.port.is_empty() && !self.port.contains(&destination.port) {
            return false;
        }

        let inbound = session.inbound();

        if !self.source_ip.is_empty() {
            let source = inbound
                .and_then(|i| i.source.as_ref())
                .and_then(|s| s.address.ip());
            match source {
                Some(ip) if self.source_ip.contains(&ip) => {}
                _ => return false,
            }
        }

        if !self.inbound_tag.is_empty() {
            match inbound {
                Some(i) if self.inbound_tag.contains(&i.tag) => {}
                _ => return false,
            }
        }

        true
    }
}

/// Ordered rule list.
#[derive(Debug, Clone, Default)]
pub struct Router {
    rules: Vec<RoutingRule>,
}

impl Router {
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        Self { rules }
    }

    pub fn add_rule(&mut self, rule: RoutingRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    /// The tag picked for this session, or `None` to use the default.
    pub fn pick(&self, session: &Session, destination: &Destination) -> Option<String> {
        let forced = session.forced_outbound_tag();
        if !forced.is_empty() {
            return Some(forced);
        }
        self.rules
            .iter()
            .find(|rule| rule.matches(session, destination))
            .map(|rule| rule.outbound_tag.clone())
    }
}
