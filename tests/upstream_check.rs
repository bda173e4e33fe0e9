mod support;

use catchall::admission::{UpstreamCheck, UpstreamResolver};
use catchall::config::Transport;
use std::time::{Duration, Instant};
use support::{launch, local_addr};
use tokio::net::UdpSocket;

#[tokio::test]
async fn resolver_finds_synthesized_names() {
    let launched = launch().await;
    let resolver = UpstreamResolver::new(
        local_addr(&launched, Transport::Udp),
        Duration::from_secs(2),
    );

    assert!(resolver.exists("www.owned.test").await);
    assert!(resolver.exists("static.owned.test.").await);

    launched.shutdown();
}

#[tokio::test]
async fn resolver_misses_unknown_names() {
    let launched = launch().await;
    let resolver = UpstreamResolver::new(
        local_addr(&launched, Transport::Udp),
        Duration::from_secs(2),
    );

    assert!(!resolver.exists("nothing.elsewhere.example").await);
    assert!(!resolver.exists("").await);

    launched.shutdown();
}

#[tokio::test]
async fn silent_resolver_fails_closed() {
    support::subscribe();
    // Bound but never read, so every query times out.
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let resolver = UpstreamResolver::new(silent.local_addr().unwrap(), Duration::from_millis(200));

    let started = Instant::now();
    assert!(!resolver.exists("www.owned.test").await);
    assert!(started.elapsed() < Duration::from_secs(5));
}
