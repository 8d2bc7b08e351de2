//! TCP inbound listener.
//!
//! Accepts connections, builds the base session for each one and hands it
//! to the dispatcher found on that session. Bytes are relayed in both
//! directions until either side closes.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tether_session::{
    Content, Destination, Dispatcher, DynDispatcher, Inbound, Session, SessionId,
    SniffingRequest, Sockopt,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::client::ClientConnection;

/// Inbound listener configuration.
#[derive(Debug, Clone)]
pub struct InboundConfig {
    /// Address to listen on (port 0 for OS-assigned)
    pub listen: SocketAddr,
    /// Inbound tag recorded on every session
    pub tag: String,
    /// Destination every accepted connection is forwarded to
    pub target: Destination,
    /// Route every connection to this outbound, bypassing rules
    pub forced_outbound_tag: Option<String>,
    /// Prefer a multiplexed outbound
    pub mux_preferred: bool,
    /// Socket options for outgoing connections
    pub sockopt: Option<Sockopt>,
    /// Sniffing settings recorded on the session's content
    pub sniffing: Option<SniffingRequest>,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
}

impl Default for InboundConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1080),
            tag: "tunnel-in".into(),
            target: Destination::tcp(IpAddr::V4(Ipv4Addr::LOCALHOST), 80),
            forced_outbound_tag: None,
            mux_preferred: false,
            sockopt: None,
            sniffing: None,
            max_connections: Some(1024),
        }
    }
}

/// Shared state for the accept loop.
struct ListenerState {
    dispatcher: Arc<dyn DynDispatcher>,
    config: InboundConfig,
    gateway: Destination,
    client_count: AtomicUsize,
}

/// The inbound listener: accepts connections and relays them outbound.
pub struct InboundListener {
    /// Shutdown signal
    shutdown_tx: Option<mpsc::Sender<()>>,
    /// Accept loop task handle
    handle: Option<tokio::task::JoinHandle<()>>,
    /// Actual bound address
    local_addr: SocketAddr,
    state: Arc<ListenerState>,
}

impl InboundListener {
    /// Bind and start accepting. Every session gets `dispatcher` attached.
    pub async fn start<D: Dispatcher>(
        config: InboundConfig,
        dispatcher: Arc<D>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.listen).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        let state = Arc::new(ListenerState {
            dispatcher,
            gateway: Destination::from(local_addr),
            config,
            client_count: AtomicUsize::new(0),
        });

        info!(
            "Inbound [{}] listening on {local_addr}, forwarding to {}",
            state.config.tag, state.config.target
        );

        let loop_state = state.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => accept_connection(stream, peer, &loop_state),
                            Err(e) => {
                                error!("Accept failed on {local_addr}: {e}");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
            local_addr,
            state,
        })
    }

    /// Get the actual bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connections currently being served.
    pub fn client_count(&self) -> usize {
        self.state.client_count.load(Ordering::Relaxed)
    }

    /// Stop accepting new connections. Connections already accepted run to
    /// completion.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        info!("Inbound [{}] stopped", self.state.config.tag);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

fn accept_connection(stream: TcpStream, peer: SocketAddr, state: &Arc<ListenerState>) {
    if let Some(max) = state.config.max_connections {
        let current = state.client_count.load(Ordering::Relaxed);
        if current >= max {
            warn!("Connection from {peer} rejected: max connections reached ({max})");
            return;
        }
    }

    state.client_count.fetch_add(1, Ordering::Relaxed);
    let state = state.clone();
    tokio::spawn(async move {
        handle_connection(stream, peer, &state).await;
        state.client_count.fetch_sub(1, Ordering::Relaxed);
    });
}

/// Build the base session for a freshly accepted connection.
fn base_session(
    state: &ListenerState,
    client: &Arc<ClientConnection>,
    local: Option<SocketAddr>,
) -> Session {
    let config = &state.config;

    let mut session = Session::new()
        .with_id(client.id)
        .with_inbound(Inbound {
            source: Some(Destination::from(client.peer)),
            gateway: Some(state.gateway.clone()),
            local: local.map(Destination::from),
            tag: config.tag.clone(),
            name: "tunnel".into(),
            user: None,
        })
        .with_dispatcher(state.dispatcher.clone())
        .with_error_feedback(client);

    if let Some(sniffing) = &config.sniffing {
        session = session.with_content(Arc::new(Content::with_sniffing(sniffing.clone())));
    }
    if let Some(tag) = config.forced_outbound_tag.as_deref().filter(|t| !t.is_empty()) {
        session = session.with_forced_outbound_tag(tag);
    }
    if config.mux_preferred {
        session = session.with_mux_preferred(true);
    }
    if let Some(sockopt) = &config.sockopt {
        session = session.with_sockopt(sockopt.clone());
    }
    session
}

async fn handle_connection(mut inbound: TcpStream, peer: SocketAddr, state: &ListenerState) {
    let client = Arc::new(ClientConnection::new(SessionId::new(), peer));
    let session = base_session(state, &client, inbound.local_addr().ok());
    info!("{} accepted {peer} [{}]", session.id(), state.config.tag);

    let Some(dispatcher) = session.dispatcher() else {
        error!("{} no dispatcher attached", session.id());
        return;
    };

    let mut outbound = match dispatcher.dispatch_dyn(&session, state.config.target.clone()).await {
        Ok(stream) => stream,
        Err(err) => {
            // Prefer the root cause reported by the failing stage.
            let cause = client.first_error().unwrap_or(err);
            warn!("{} connection from {peer} failed: {cause}", session.id());
            return;
        }
    };

    match tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await {
        Ok((up, down)) => {
            debug!(
                "{} closed after {:?} ({up} bytes up, {down} bytes down)",
                session.id(),
                client.elapsed()
            );
        }
        Err(e) => {
            debug!("{} relay ended: {e}", session.id());
        }
    }
}
