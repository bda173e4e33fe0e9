#![allow(unused)]

use catchall::config::Transport;
use catchall::notification::{DynNotifier, NullNotifier};
use catchall::{Config, Launched};
use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::net::UdpSocket;
use trust_dns_proto::op::Message;

pub const TOKEN: &str = "LoqXcYV8q5ONbJQxbmR7SCTNo3tiAXDfowyjxAjEuX0";

/// Registers a global default tracing subscriber when called for the first time. This is intended
/// for use in tests.
pub fn subscribe() {
    static INSTALL_TRACING_SUBSCRIBER: Once = Once::new();
    INSTALL_TRACING_SUBSCRIBER.call_once(|| {
        let subscriber = tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .finish();
        tracing::subscriber::set_global_default(subscriber).unwrap();
    });
}

pub fn config() -> Config {
    Config::try_from_str(
        r#"{
            "ip": "127.0.0.1",
            "dns_port": 0,
            "dns_protocol": "both",
            "default_domain": "catch.test",
            "domains": ["owned.test", "catch.test"],
            "ns_name": "ns1.catch.test",
            "ns_admin": "admin@catch.test",
            "records": [
                "static.owned.test. 300 IN A 192.0.2.7",
                "owned.test. TXT \"v=spf1 -all\""
            ],
            "api_bind_addr": "127.0.0.1:0"
        }"#,
    )
    .unwrap()
}

pub async fn launch() -> Launched {
    subscribe();
    let notifier: DynNotifier = Arc::new(NullNotifier);
    catchall::launch(Arc::new(config()), notifier).await.unwrap()
}

pub fn local_addr(launched: &Launched, transport: Transport) -> SocketAddr {
    launched
        .local_addrs
        .iter()
        .find(|(t, _)| *t == transport)
        .map(|(_, addr)| *addr)
        .unwrap()
}

/// Send a raw message over UDP and decode the reply.
pub async fn exchange_udp(addr: SocketAddr, message: &Message) -> Message {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(&message.to_vec().unwrap(), addr).await.unwrap();

    let mut buf = vec![0u8; 4096];
    let (len, _) = tokio::time::timeout(Duration::from_secs(5), socket.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    Message::from_vec(&buf[..len]).unwrap()
}
