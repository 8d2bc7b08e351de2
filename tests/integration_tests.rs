//! End-to-end integration tests: router configuration, inbound listener
//! and outbound dialing working together through the session handle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tether_router::RouterConfig;
use tether_session::Destination;
use tether_transport::{InboundConfig, InboundListener};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// Start a TCP echo server on a random port.
async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut rd, mut wr) = stream.split();
                let _ = tokio::io::copy(&mut rd, &mut wr).await;
            });
        }
    });
    addr
}

/// Start the proxy in front of `target` with the given router config.
async fn start_proxy(router: &str, target: SocketAddr, forced: Option<&str>) -> InboundListener {
    let dispatcher = Arc::new(RouterConfig::from_json(router).unwrap().build().unwrap());
    let config = InboundConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
        tag: "it-in".into(),
        target: Destination::from(target),
        forced_outbound_tag: forced.map(String::from),
        ..Default::default()
    };
    InboundListener::start(config, dispatcher).await.unwrap()
}

async fn roundtrip(addr: SocketAddr, payload: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(payload).await?;
    let mut buf = vec![0u8; payload.len()];
    timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .map_err(|_| std::io::Error::other("timed out"))??;
    Ok(buf)
}

const ROUTER: &str = r#"{
    "outbounds": [
        {"tag": "direct", "protocol": "freedom"},
        {"tag": "block", "protocol": "blackhole"}
    ],
    "rules": [
        {"inboundTag": ["quarantine"], "outboundTag": "block"}
    ]
}"#;

#[tokio::test]
async fn default_route_relays() {
    let echo = start_echo_server().await;
    let mut proxy = start_proxy(ROUTER, echo, None).await;

    let reply = roundtrip(proxy.local_addr(), b"end to end").await.unwrap();
    assert_eq!(reply, b"end to end");

    proxy.stop().await;
}

#[tokio::test]
async fn forced_tag_overrides_default_route() {
    let echo = start_echo_server().await;
    let mut proxy = start_proxy(ROUTER, echo, Some("block")).await;

    assert!(roundtrip(proxy.local_addr(), b"blocked").await.is_err());

    proxy.stop().await;
}

#[tokio::test]
async fn port_rule_blocks_destination() {
    let echo = start_echo_server().await;
    let router = format!(
        r#"{{
            "outbounds": [
                {{"tag": "direct", "protocol": "freedom"}},
                {{"tag": "block", "protocol": "blackhole"}}
            ],
            "rules": [{{"port": [{}], "outboundTag": "block"}}]
        }}"#,
        echo.port()
    );

    let mut blocked = start_proxy(&router, echo, None).await;
    assert!(roundtrip(blocked.local_addr(), b"nope").await.is_err());

    // Forcing the direct outbound bypasses the rule.
    let mut forced = start_proxy(&router, echo, Some("direct")).await;
    assert_eq!(roundtrip(forced.local_addr(), b"yes").await.unwrap(), b"yes");

    blocked.stop().await;
    forced.stop().await;
}

#[tokio::test]
async fn many_concurrent_connections() {
    let echo = start_echo_server().await;
    let mut proxy = start_proxy(ROUTER, echo, None).await;
    let addr = proxy.local_addr();

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            tokio::spawn(async move {
                let payload = format!("connection {i:02}");
                let reply = roundtrip(addr, payload.as_bytes()).await.unwrap();
                assert_eq!(reply, payload.as_bytes());
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    proxy.stop().await;
}
