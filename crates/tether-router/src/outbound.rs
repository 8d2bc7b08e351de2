//! Outbound handlers: the components that actually open connections.

use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;

use tether_session::{BoxStream, Destination, OutboundError, RoutingConfig, Session, Sockopt};
use tokio::net::TcpSocket;
use tracing::{debug, warn};

/// An outbound handler, addressed by its tag.
pub trait OutboundHandler: Send + Sync {
    /// Tag routing rules and the forced outbound tag refer to.
    fn tag(&self) -> &str;

    /// Protocol name recorded in the session's outbound facet.
    fn name(&self) -> &str;

    /// Source address to dial from, if pinned.
    fn send_through(&self) -> Option<IpAddr> {
        None
    }

    /// Socket options applied to this handler's connections.
    fn sockopt(&self) -> Option<&Sockopt> {
        None
    }

    /// Open a connection to `destination` on behalf of `session`.
    ///
    /// Failures are reported through the session's error feedback at the
    /// point they happen, then returned.
    fn dial(
        &self,
        session: &Session,
        destination: &Destination,
    ) -> impl Future<Output = Result<BoxStream, OutboundError>> + Send;
}

/// Object-safe wrapper for the OutboundHandler trait.
pub(crate) trait OutboundHandlerDyn: Send + Sync {
    fn tag_dyn(&self) -> &str;
    fn name_dyn(&self) -> &str;
    fn send_through_dyn(&self) -> Option<IpAddr>;
    fn sockopt_dyn(&self) -> Option<&Sockopt>;
    fn dial_dyn<'a>(
        &'a self,
        session: &'a Session,
        destination: &'a Destination,
    ) -> Pin<Box<dyn Future<Output = Result<BoxStream, OutboundError>> + Send + 'a>>;
}

impl<T: OutboundHandler> OutboundHandlerDyn for T {
    fn tag_dyn(&self) -> &str {
        self.tag()
    }
    fn name_dyn(&self) -> &str {
        self.name()
    }
    fn send_through_dyn(&self) -> Option<IpAddr> {
        self.send_through()
    }
    fn sockopt_dyn(&self) -> Option<&Sockopt> {
        self.sockopt()
    }
    fn dial_dyn<'a>(
        &'a self,
        session: &'a Session,
        destination: &'a Destination,
    ) -> Pin<Box<dyn Future<Output = Result<BoxStream, OutboundError>> + Send + 'a>> {
        Box::pin(self.dial(session, destination))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Freedom
// ─────────────────────────────────────────────────────────────────────────────

/// Direct outbound: connects to the destination itself.
pub struct Freedom {
    tag: String,
    send_through: Option<IpAddr>,
    sockopt: Option<Sockopt>,
    routing: &'static RoutingConfig,
}

impl Freedom {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            send_through: None,
            sockopt: None,
            routing: RoutingConfig::global(),
        }
    }

    pub fn with_send_through(mut self, ip: IpAddr) -> Self {
        self.send_through = Some(ip);
        self
    }

    pub fn with_sockopt(mut self, sockopt: Sockopt) -> Self {
        self.sockopt = Some(sockopt);
        self
    }

    /// Read the outbound-IP override from `routing` instead of the global
    /// configuration.
    pub fn with_routing_config(mut self, routing: &'static RoutingConfig) -> Self {
        self.routing = routing;
        self
    }

    async fn connect(
        session: &Session,
        gateway: Option<IpAddr>,
        addr: SocketAddr,
    ) -> io::Result<BoxStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };

        match gateway {
            Some(ip) if ip.is_ipv4() == addr.is_ipv4() => socket.bind(SocketAddr::new(ip, 0))?,
            Some(ip) => debug!("{} gateway {ip} does not match {addr}, not binding", session.id()),
            None => {}
        }

        if let Some(sockopt) = session.sockopt() {
            apply_sockopt(&socket, sockopt)?;
        }

        let stream = socket.connect(addr).await?;
        Ok(Box::new(stream))
    }
}

/// Apply `sockopt` to an unconnected socket.
///
/// A zero mark and an absent interface leave the socket untouched. Setting
/// either one needs Linux, and the mark needs `CAP_NET_ADMIN`.
pub fn apply_sockopt(socket: &TcpSocket, sockopt: &Sockopt) -> io::Result<()> {
    #[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
    {
        if let Some(interface) = &sockopt.interface {
            socket.bind_device(Some(interface.as_bytes()))?;
        }
        if sockopt.mark != 0 {
            socket2::SockRef::from(socket).set_mark(sockopt.mark)?;
        }
        Ok(())
    }

    #[cfg(not(any(target_os = "android", target_os = "fuchsia", target_os = "linux")))]
    {
        let _ = socket;
        if sockopt.mark != 0 || sockopt.interface.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "socket mark and interface binding need Linux",
            ));
        }
        Ok(())
    }
}

async fn resolve(destination: &Destination) -> io::Result<Vec<SocketAddr>> {
    if let Some(addr) = destination.socket_addr() {
        return Ok(vec![addr]);
    }
    let host = destination.address.to_string();
    Ok(tokio::net::lookup_host((host.as_str(), destination.port)).await?.collect())
}

impl OutboundHandler for Freedom {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn name(&self) -> &str {
        "freedom"
    }

    fn send_through(&self) -> Option<IpAddr> {
        self.send_through
    }

    fn sockopt(&self) -> Option<&Sockopt> {
        self.sockopt.as_ref()
    }

    async fn dial(
        &self,
        session: &Session,
        destination: &Destination,
    ) -> Result<BoxStream, OutboundError> {
        let gateway = session
            .outbound_with(self.routing)
            .and_then(|outbound| outbound.gateway)
            .and_then(|address| address.ip());

        let resolved = resolve(destination).await.and_then(|addrs| {
            if addrs.is_empty() {
                Err(io::Error::new(io::ErrorKind::NotFound, "no addresses found"))
            } else {
                Ok(addrs)
            }
        });
        let addrs = match resolved {
            Ok(addrs) => addrs,
            Err(e) => {
                let err = OutboundError::resolve(destination.address.to_string(), e);
                warn!("{} {err}", session.id());
                session.submit_outbound_error(err.clone());
                return Err(err);
            }
        };

        let mut last_err = None;
        for addr in addrs {
            match Self::connect(session, gateway, addr).await {
                Ok(stream) => {
                    debug!("{} connected to {addr} via {}", session.id(), self.tag);
                    return Ok(stream);
                }
                Err(e) => {
                    debug!("{} dial {addr} failed: {e}", session.id());
                    last_err = Some(e);
                }
            }
        }

        let source = last_err.unwrap_or_else(|| io::Error::other("no address to dial"));
        let err = OutboundError::dial(destination.clone(), source);
        warn!("{} {err}", session.id());
        session.submit_outbound_error(err.clone());
        Err(err)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Blackhole
// ─────────────────────────────────────────────────────────────────────────────

/// Outbound that refuses every request.
pub struct Blackhole {
    tag: String,
}

impl Blackhole {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into() }
    }
}

impl OutboundHandler for Blackhole {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn name(&self) -> &str {
        "blackhole"
    }

    async fn dial(
        &self,
        session: &Session,
        destination: &Destination,
    ) -> Result<BoxStream, OutboundError> {
        debug!("{} blocked {destination} via {}", session.id(), self.tag);
        let err = OutboundError::Blocked(destination.clone());
        session.submit_outbound_error(err.clone());
        Err(err)
    }
}
