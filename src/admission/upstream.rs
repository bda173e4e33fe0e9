//! Live existence checks against a public recursive resolver.

use crate::dns::lower_fqdn;
use crate::error::Error;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::debug;
use trust_dns_client::client::{AsyncClient, ClientHandle};
use trust_dns_client::rr::{DNSClass, Name, RecordType};
use trust_dns_client::udp::UdpClientStream;

/// Decides whether a hostname exists in the public DNS.
#[async_trait::async_trait]
pub trait UpstreamCheck {
    async fn exists(&self, hostname: &str) -> bool;
}

/// Queries a recursive resolver over UDP for A, then AAAA, then CNAME records. The first
/// answer of the queried type wins.
#[derive(Debug, Clone)]
pub struct UpstreamResolver {
    resolver: SocketAddr,
    timeout: Duration,
}

impl UpstreamResolver {
    /// `timeout` bounds each individual query.
    pub fn new(resolver: SocketAddr, timeout: Duration) -> Self {
        Self { resolver, timeout }
    }

    async fn has_record(&self, name: &Name, record_type: RecordType) -> Result<bool, Error> {
        let stream = UdpClientStream::<UdpSocket>::with_timeout(self.resolver, self.timeout);
        let (mut client, background) = AsyncClient::connect(stream).await?;
        let background = tokio::spawn(background);

        let response = client.query(name.clone(), DNSClass::IN, record_type).await;
        background.abort();

        // Only the leading answer counts: a CNAME in front of an A answer is not an A record.
        Ok(response?
            .answers()
            .first()
            .map_or(false, |answer| answer.record_type() == record_type))
    }
}

#[async_trait::async_trait]
impl UpstreamCheck for UpstreamResolver {
    async fn exists(&self, hostname: &str) -> bool {
        let name: Name = match lower_fqdn(hostname) {
            Ok(name) => name.into(),
            Err(_) => return false,
        };
        for record_type in [RecordType::A, RecordType::AAAA, RecordType::CNAME] {
            match self.has_record(&name, record_type).await {
                Ok(true) => return true,
                Ok(false) => debug!(hostname, %record_type, "no upstream record"),
                Err(err) => debug!(hostname, %record_type, error = %err, "upstream lookup failed"),
            }
        }
        false
    }
}
