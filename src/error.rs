//! Error types.

use axum::extract::rejection::JsonRejection;
use std::net::{IpAddr, SocketAddr};
use trust_dns_server::client::rr::LowerName;
use trust_dns_server::proto::error::ProtoError;

/// Error enumerates the possible catchall error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned when clients `POST` the [`/present`][crate::api#present-post] or
    /// [`/cleanup`][crate::api#cleanup-post] endpoints from a source IP address that isn't in
    /// a [`Config::api_acl`][`crate::config::Config::api_acl`] network.
    #[error("IP {0} is not authorized to manage challenges")]
    AuthForbidden(IpAddr),

    /// Returned by the [`/ask` API endpoint][crate::api#ask-get] when the
    /// [admission policy][crate::admission::AdmissionPolicy] denies issuance for a hostname.
    #[error("{0}")]
    IssuanceDenied(crate::admission::DenyReason),

    /// Returned when clients `POST` invalid JSON.
    #[error(transparent)]
    JsonExtractorRejection(#[from] JsonRejection),

    /// Returned when clients `POST` the [`/present` API endpoint][crate::api#present-post] with
    /// a `token` value that isn't a valid [RFC-8555][RFC-8555] [DNS-01] challenge response value.
    ///
    /// These values MUST be a BASE64 encoded 32 byte SHA256 digest.
    ///
    /// [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
    /// [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
    #[error("token is not a valid DNS-01 challenge response")]
    InvalidDNS01,

    /// Returned when a non-fully qualified [`LowerName`] is provided to
    /// [`TokenStore::set_token`][`crate::challenge_store::TokenStore::set_token`].
    #[error("challenge store key is not a fully qualified name: \"{0}\"")]
    NotFQDN(LowerName),

    /// Returned when a configured domain or record owner can't be parsed as a DNS name.
    #[error("invalid domain name \"{0}\"")]
    InvalidName(String),

    /// Returned when a static record line from the configuration can't be parsed.
    #[error("invalid record \"{line}\": {reason}")]
    InvalidRecord { line: String, reason: String },

    /// Returned when a TLS or notification filter is not a valid regular expression.
    #[error("invalid filter")]
    InvalidFilter(#[from] regex::Error),

    /// Returned when [`Config::dns_protocol`][`crate::config::Config::dns_protocol`] is not
    /// one of `udp`, `tcp` or `both`, optionally suffixed with `4` or `6`.
    #[error("unknown DNS protocol \"{0}\"")]
    UnknownProtocol(String),

    /// Returned when the address family suffix of the DNS protocol doesn't match
    /// [`Config::ip`][`crate::config::Config::ip`].
    #[error("DNS protocol \"{0}\" does not match the address family of {1}")]
    ProtocolFamilyMismatch(String, IpAddr),

    /// Returned when the [`Config::api_bind_addr`][`crate::config::Config::api_bind_addr`] is
    /// not a loopback address, or an address within a private network space. The
    /// [challenge HTTP API][crate::api] publishes tokens to the nameservers and decides on
    /// certificate issuance, so it is only ever exposed to a local certificate client.
    #[error("API bind address ({0}) must be a loopback or private IP")]
    InsecureAPIBind(IpAddr),

    /// Returned when a nameserver stops before it signalled that it was listening.
    #[error("nameserver for {0} stopped before listening")]
    NotListening(SocketAddr),

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when [trying to load a `Config`][crate::config::Config::try_from_file] fails
    /// due to invalid JSON content.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),

    /// Returned when an upstream existence check can't complete its query.
    #[error("upstream DNS query failed")]
    UpstreamQuery(#[from] trust_dns_client::error::ClientError),

    /// Returned when the DNS server encounters a generic DNS protocol error.
    #[error("DNS error")]
    DNSError(#[from] ProtoError),
}
