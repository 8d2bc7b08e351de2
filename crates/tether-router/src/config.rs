//! Router configuration loaded from JSON.
//!
//! ```json
//! {
//!   "outbounds": [
//!     { "tag": "direct", "protocol": "freedom", "sendThrough": "10.0.0.2" },
//!     { "tag": "block", "protocol": "blackhole" }
//!   ],
//!   "rules": [
//!     { "domainSuffix": ["ads.example"], "outboundTag": "block" }
//!   ],
//!   "defaultOutbound": "direct"
//! }
//! ```

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tether_session::Sockopt;
use thiserror::Error;

use crate::dispatcher::DefaultDispatcher;
use crate::outbound::{Blackhole, Freedom};
use crate::registry::OutboundManager;
use crate::rules::{Router, RoutingRule};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate outbound tag `{0}`")]
    DuplicateTag(String),

    #[error("unknown outbound tag `{0}`")]
    UnknownTag(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundProtocol {
    Freedom,
    Blackhole,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundSettings {
    pub tag: String,
    pub protocol: OutboundProtocol,
    #[serde(default)]
    pub send_through: Option<IpAddr>,
    #[serde(default)]
    pub sockopt: Option<Sockopt>,
}

impl OutboundSettings {
    pub fn freedom(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            protocol: OutboundProtocol::Freedom,
            send_through: None,
            sockopt: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    #[serde(default)]
    pub outbounds: Vec<OutboundSettings>,
    #[serde(default)]
    pub rules: Vec<RoutingRule>,
    /// Defaults to the first outbound.
    #[serde(default)]
    pub default_outbound: Option<String>,
}

impl RouterConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Configuration used when no file is given: a single `direct` outbound.
    pub fn direct_only() -> Self {
        Self {
            outbounds: vec![OutboundSettings::freedom("direct")],
            ..Default::default()
        }
    }

    /// Check that tags are unique and every reference resolves.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut tags = HashSet::new();
        for outbound in &self.outbounds {
            if !tags.insert(outbound.tag.as_str()) {
                return Err(ConfigError::DuplicateTag(outbound.tag.clone()));
            }
        }

        let referenced = self
            .rules
            .iter()
            .map(|rule| &rule.outbound_tag)
            .chain(self.default_outbound.as_ref());
        for tag in referenced {
            if !tags.contains(tag.as_str()) {
                return Err(ConfigError::UnknownTag(tag.clone()));
            }
        }
        Ok(())
    }

    /// Validate and build the dispatcher.
    pub fn build(&self) -> Result<DefaultDispatcher, ConfigError> {
        self.validate()?;

        let manager = Arc::new(OutboundManager::new());
        for settings in &self.outbounds {
            match settings.protocol {
                OutboundProtocol::Freedom => {
                    let mut freedom = Freedom::new(&settings.tag);
                    if let Some(ip) = settings.send_through {
                        freedom = freedom.with_send_through(ip);
                    }
                    if let Some(sockopt) = &settings.sockopt {
                        freedom = freedom.with_sockopt(sockopt.clone());
                    }
                    manager.add(freedom);
                }
                OutboundProtocol::Blackhole => {
                    manager.add(Blackhole::new(&settings.tag));
                }
            }
        }
        if let Some(tag) = &self.default_outbound {
            manager.set_default(tag);
        }

        Ok(DefaultDispatcher::new(manager, Router::new(self.rules.clone())))
    }
}
