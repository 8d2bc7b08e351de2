//! Routing configuration shared by every session.
//!
//! Holds the outbound-IP override. When the proxy's own egress traffic can
//! loop back into one of its listeners, pinning the outbound gateway lets
//! routing rules recognise that traffic and deny it.
//!
//! The override is write-once: the first call to
//! [`RoutingConfig::set_outbound_ip`] wins and every later call is ignored.
//! Changing it requires a process restart.

use std::net::IpAddr;
use std::sync::OnceLock;

use tracing::{debug, info};

static GLOBAL: RoutingConfig = RoutingConfig::new();

/// Write-once routing settings.
///
/// [`RoutingConfig::global`] is the process-wide instance read by
/// [`Session::outbound`](crate::Session::outbound). Tests can build their own
/// instance and read through
/// [`Session::outbound_with`](crate::Session::outbound_with).
#[derive(Debug, Default)]
pub struct RoutingConfig {
    outbound_ip: OnceLock<IpAddr>,
}

impl RoutingConfig {
    pub const fn new() -> Self {
        Self {
            outbound_ip: OnceLock::new(),
        }
    }

    /// The process-wide configuration.
    pub fn global() -> &'static RoutingConfig {
        &GLOBAL
    }

    /// Pin the outbound gateway address. Returns `true` if this call set it.
    ///
    /// An unspecified address (`0.0.0.0` or `::`) still consumes the slot but
    /// disables the override for the rest of the process.
    pub fn set_outbound_ip(&self, ip: IpAddr) -> bool {
        let mut won = false;
        let current = self.outbound_ip.get_or_init(|| {
            won = true;
            ip
        });
        if won {
            info!("Outbound IP override set: {current}");
        } else {
            debug!("Outbound IP override already set to {current}, ignoring {ip}");
        }
        won
    }

    /// The effective override, if one is configured.
    pub fn outbound_ip(&self) -> Option<IpAddr> {
        self.outbound_ip
            .get()
            .copied()
            .filter(|ip| !ip.is_unspecified())
    }

    /// Whether `set_outbound_ip` has been called at all, including with an
    /// unspecified address.
    pub fn is_outbound_ip_configured(&self) -> bool {
        self.outbound_ip.get().is_some()
    }
}
