//! Transport layer tests: session construction at accept time, relaying,
//! and outbound failure handling.

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;
    use tether_router::{Blackhole, DefaultDispatcher, Freedom, OutboundManager, Router};
    use tether_session::*;
    use tether_transport::{ClientConnection, InboundConfig, InboundListener};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    #[derive(Debug, Clone)]
    struct Seen {
        id: SessionId,
        inbound: Option<Inbound>,
        forced_tag: String,
        mux: bool,
        sockopt: Option<Sockopt>,
        sniffing: Option<SniffingRequest>,
        has_feedback: bool,
        has_dispatcher: bool,
        destination: Destination,
    }

    /// Dispatcher that records what it was handed and refuses.
    #[derive(Default)]
    struct Capture {
        seen: Mutex<Vec<Seen>>,
    }

    impl Dispatcher for Capture {
        async fn dispatch(
            &self,
            session: &Session,
            destination: Destination,
        ) -> Result<BoxStream, OutboundError> {
            self.seen.lock().push(Seen {
                id: session.id(),
                inbound: session.inbound().cloned(),
                forced_tag: session.forced_outbound_tag(),
                mux: session.mux_preferred(),
                sockopt: session.sockopt().cloned(),
                sniffing: session.content().map(|c| c.sniffing_request()),
                has_feedback: session.has_error_feedback(),
                has_dispatcher: session.dispatcher().is_some(),
                destination,
            });
            session.submit_outbound_error(OutboundError::NoOutbound);
            Err(OutboundError::NoOutbound)
        }
    }

    fn localhost() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    fn any_port() -> SocketAddr {
        SocketAddr::new(localhost(), 0)
    }

    async fn echo_server() -> SocketAddr {
        let listener = TcpListener::bind(any_port()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let (mut rd, mut wr) = stream.split();
                    let _ = tokio::io::copy(&mut rd, &mut wr).await;
                });
            }
        });
        addr
    }

    fn router_dispatcher() -> Arc<DefaultDispatcher> {
        let manager = Arc::new(OutboundManager::new());
        manager.add(Freedom::new("direct"));
        manager.add(Blackhole::new("block"));
        Arc::new(DefaultDispatcher::new(manager, Router::default()))
    }

    /// Read until EOF; returns the bytes read.
    async fn read_to_close(stream: &mut TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
            .await
            .expect("connection was not closed")
            .unwrap_or_default();
        buf
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session construction
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn accepted_connection_gets_base_session() {
        let capture = Arc::new(Capture::default());
        let target = Destination::tcp("backend.internal", 9000);
        let sniffing = SniffingRequest {
            enabled: true,
            override_destination_for_protocol: vec!["tls".into()],
            ..Default::default()
        };
        let config = InboundConfig {
            listen: any_port(),
            tag: "edge".into(),
            target: target.clone(),
            forced_outbound_tag: Some("direct".into()),
            mux_preferred: true,
            sockopt: Some(Sockopt { mark: 9, interface: None }),
            sniffing: Some(sniffing.clone()),
            max_connections: Some(8),
        };
        let mut listener = InboundListener::start(config, capture.clone()).await.unwrap();

        let mut client = TcpStream::connect(listener.local_addr()).await.unwrap();
        let client_addr = client.local_addr().unwrap();
        assert!(read_to_close(&mut client).await.is_empty());

        let seen = capture.seen.lock().clone();
        assert_eq!(seen.len(), 1);
        let seen = &seen[0];
        assert!(!seen.id.is_unset());
        assert_eq!(seen.destination, target);
        assert_eq!(seen.forced_tag, "direct");
        assert!(seen.mux);
        assert_eq!(seen.sockopt, Some(Sockopt { mark: 9, interface: None }));
        assert_eq!(seen.sniffing, Some(sniffing));
        assert!(seen.has_feedback);
        assert!(seen.has_dispatcher);

        let inbound = seen.inbound.as_ref().unwrap();
        assert_eq!(inbound.tag, "edge");
        assert_eq!(inbound.name, "tunnel");
        assert_eq!(inbound.source, Some(Destination::from(client_addr)));
        assert_eq!(inbound.gateway, Some(Destination::from(listener.local_addr())));

        listener.stop().await;
    }

    #[tokio::test]
    async fn empty_forced_tag_is_not_attached() {
        let capture = Arc::new(Capture::default());
        let config = InboundConfig {
            listen: any_port(),
            forced_outbound_tag: Some(String::new()),
            ..Default::default()
        };
        let mut listener = InboundListener::start(config, capture.clone()).await.unwrap();

        let mut client = TcpStream::connect(listener.local_addr()).await.unwrap();
        read_to_close(&mut client).await;

        let seen = capture.seen.lock().clone();
        assert_eq!(seen[0].forced_tag, "");
        assert!(seen[0].sniffing.is_none());
        assert!(!seen[0].mux);
        listener.stop().await;
    }

    #[test]
    fn client_connection_collects_feedback() {
        let client = Arc::new(ClientConnection::new(SessionId(4), any_port()));
        let session = Session::new().with_error_feedback(&client);

        session.submit_outbound_error(OutboundError::NoOutbound);
        session.submit_outbound_error(OutboundError::NoDispatcher);

        assert_eq!(client.errors().len(), 2);
        assert!(matches!(client.first_error(), Some(OutboundError::NoOutbound)));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Relaying
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn relays_through_direct_outbound() {
        let backend = echo_server().await;
        let config = InboundConfig {
            listen: any_port(),
            target: Destination::from(backend),
            ..Default::default()
        };
        let mut listener = InboundListener::start(config, router_dispatcher()).await.unwrap();

        let mut client = TcpStream::connect(listener.local_addr()).await.unwrap();
        client.write_all(b"ping over tether").await.unwrap();
        let mut buf = [0u8; 16];
        timeout(Duration::from_secs(5), client.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf, b"ping over tether");

        drop(client);
        listener.stop().await;
    }

    #[tokio::test]
    async fn forced_blackhole_closes_connection() {
        let backend = echo_server().await;
        let config = InboundConfig {
            listen: any_port(),
            target: Destination::from(backend),
            forced_outbound_tag: Some("block".into()),
            ..Default::default()
        };
        let mut listener = InboundListener::start(config, router_dispatcher()).await.unwrap();

        let mut client = TcpStream::connect(listener.local_addr()).await.unwrap();
        let _ = client.write_all(b"dropped").await;
        assert!(read_to_close(&mut client).await.is_empty());
        listener.stop().await;
    }

    #[tokio::test]
    async fn dial_failure_closes_connection() {
        let dead = {
            let listener = TcpListener::bind(any_port()).await.unwrap();
            listener.local_addr().unwrap()
        };
        let config = InboundConfig {
            listen: any_port(),
            target: Destination::from(dead),
            ..Default::default()
        };
        let mut listener = InboundListener::start(config, router_dispatcher()).await.unwrap();

        let mut client = TcpStream::connect(listener.local_addr()).await.unwrap();
        assert!(read_to_close(&mut client).await.is_empty());

        // The connection task finishes right after closing the socket.
        timeout(Duration::from_secs(5), async {
            while listener.client_count() != 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        listener.stop().await;
    }

    #[tokio::test]
    async fn stop_releases_the_port() {
        let config = InboundConfig {
            listen: any_port(),
            ..Default::default()
        };
        let mut listener = InboundListener::start(config, router_dispatcher()).await.unwrap();
        let addr = listener.local_addr();
        listener.stop().await;

        assert!(TcpStream::connect(addr).await.is_err());
    }
}
