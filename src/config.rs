use crate::dns::lower_fqdn;
use crate::error::Error;
use ipnetwork::IpNetwork;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use trust_dns_server::client::rr::{LowerName, Name};

pub type Shared = Arc<Config>;

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub ip: IpAddr,
    #[serde(default = "default_dns_port")]
    pub dns_port: u16,
    #[serde(default = "default_dns_protocol")]
    pub dns_protocol: String,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_dns_tcp_timeout")]
    pub dns_tcp_timeout: Duration,
    pub default_domain: String,
    pub domains: Vec<String>,
    pub ns_name: String,
    pub ns_admin: String,
    #[serde(default)]
    pub records: Vec<String>,
    #[serde(default = "default_record_ttl")]
    pub record_ttl: u32,
    #[serde(default)]
    pub tls_filters: Vec<String>,
    #[serde(default)]
    pub tls_upstream_check: bool,
    #[serde(default = "default_upstream_resolver")]
    pub upstream_resolver: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_upstream_timeout")]
    pub upstream_timeout: Duration,
    #[serde(default)]
    pub rewrites: HashMap<String, String>,
    #[serde(default)]
    pub notification: NotificationConfig,
    pub api_bind_addr: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_api_timeout")]
    pub api_timeout: Duration,
    #[serde(default)]
    pub api_acl: Vec<IpNetwork>,
}

/// Per-protocol switches and drop-filters for the [notification][crate::notification] fan-out.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct NotificationConfig {
    pub dns: bool,
    pub dns_filters: Vec<String>,
    pub http: bool,
    pub http_filters: Vec<String>,
    pub smtp: bool,
    pub smtp_filters: Vec<String>,
    pub imap: bool,
    pub imap_filters: Vec<String>,
}

/// The transport a single [`Nameserver`][crate::dns::server::Nameserver] listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Udp => f.write_str("udp"),
            Transport::Tcp => f.write_str("tcp"),
        }
    }
}

fn default_dns_port() -> u16 {
    53
}

fn default_dns_protocol() -> String {
    "both".to_string()
}

fn default_dns_tcp_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_record_ttl() -> u32 {
    3600
}

fn default_upstream_resolver() -> SocketAddr {
    SocketAddr::from(([8, 8, 8, 8], 53))
}

fn default_upstream_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_api_timeout() -> Duration {
    Duration::from_secs(10)
}

lazy_static! {
    // NOTE(XXX): Once the "ip" feature has stabilized we can use Ipv6Addr.is_unique_local[0].
    //            Presently this feature is unstable so we home-roll. See also RFC 4193[1].
    // [0]: https://doc.rust-lang.org/std/net/struct.Ipv6Addr.html#method.is_unique_local
    // [1]: https://www.rfc-editor.org/rfc/rfc4193.html
    static ref IPV6_UNIQUE_LOCAL_NETWORK: IpNetwork = IpNetwork::from_str("fc00::/7").unwrap();
}

impl Config {
    /// Load and validate a [`Config`] from the JSON file at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the file can't be read, [`Error::InvalidJSON`] if it isn't a
    /// valid config document, or any validation error from [`Config::try_from_str`].
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = fs::read_to_string(p)?;
        Self::try_from_str(&contents)
    }

    /// Parse and validate a [`Config`] from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidJSON`] for malformed documents, and a validation error when the
    /// API bind address is public, the DNS protocol is unknown or doesn't match the address
    /// family of [`Config::ip`], a domain doesn't parse, or a filter isn't a valid regex.
    pub fn try_from_str(json: &str) -> Result<Self, Error> {
        let conf: Config = serde_json::from_str(json)?;
        conf.bind_addr_is_secure()?;
        conf.transports()?;
        conf.owned_domains()?;
        conf.default_domain()?;
        conf.tls_filters()?;
        Ok(conf)
    }

    /// The socket address every nameserver binds.
    pub fn dns_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.dns_port)
    }

    /// The transports to run a nameserver for, derived from
    /// [`Config::dns_protocol`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownProtocol`] or [`Error::ProtocolFamilyMismatch`].
    pub fn transports(&self) -> Result<Vec<Transport>, Error> {
        let proto = self.dns_protocol.to_ascii_lowercase();
        let (base, family) = match proto.strip_suffix('4') {
            Some(base) => (base, Some(4)),
            None => match proto.strip_suffix('6') {
                Some(base) => (base, Some(6)),
                None => (proto.as_str(), None),
            },
        };
        let transports = match base {
            "udp" => vec![Transport::Udp],
            "tcp" => vec![Transport::Tcp],
            "both" => vec![Transport::Udp, Transport::Tcp],
            _ => return Err(Error::UnknownProtocol(self.dns_protocol.clone())),
        };
        match (family, self.ip) {
            (Some(4), IpAddr::V6(_)) | (Some(6), IpAddr::V4(_)) => Err(
                Error::ProtocolFamilyMismatch(self.dns_protocol.clone(), self.ip),
            ),
            _ => Ok(transports),
        }
    }

    /// The apex domains this server is authoritative for, fully qualified and lower-cased.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] for a domain that isn't a valid DNS name.
    pub fn owned_domains(&self) -> Result<Vec<LowerName>, Error> {
        self.domains.iter().map(|d| lower_fqdn(d)).collect()
    }

    /// The default (mail and CNAME target) domain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] if it isn't a valid DNS name.
    pub fn default_domain(&self) -> Result<LowerName, Error> {
        lower_fqdn(&self.default_domain)
    }

    /// The compiled TLS deny-filters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilter`] for a pattern that isn't a valid regex.
    pub fn tls_filters(&self) -> Result<Vec<Regex>, Error> {
        compile_filters(&self.tls_filters)
    }

    pub fn ns_name(&self) -> Result<Name, Error> {
        Ok(lower_fqdn(&self.ns_name)?.into())
    }

    pub fn ns_admin(&self) -> Result<Name, Error> {
        Ok(lower_fqdn(&self.sanitized_ns_admin())?.into())
    }

    pub fn challenge_permitted(&self, source_ip: IpAddr) -> bool {
        self.api_acl
            .iter()
            .any(|allowed_network| allowed_network.contains(source_ip))
    }

    fn sanitized_ns_admin(&self) -> Cow<str> {
        match self.ns_admin.split_once('@') {
            Some((user, domain)) => {
                let user = user.replace('.', "\\.");
                Cow::Owned(format!("{user}.{domain}"))
            }
            _ => Cow::Borrowed(&self.ns_admin),
        }
    }

    fn bind_addr_is_secure(&self) -> Result<(), Error> {
        match self.api_bind_addr {
            SocketAddr::V4(v4_addr) => {
                let ip = v4_addr.ip();
                if !ip.is_loopback() && !ip.is_private() {
                    return Err(Error::InsecureAPIBind(IpAddr::V4(*ip)));
                }
                Ok(())
            }
            SocketAddr::V6(v6_addr) => {
                let ip = v6_addr.ip();
                if !ip.is_loopback() && !IPV6_UNIQUE_LOCAL_NETWORK.contains(IpAddr::V6(*ip)) {
                    return Err(Error::InsecureAPIBind(IpAddr::V6(*ip)));
                }
                Ok(())
            }
        }
    }
}

pub(crate) fn compile_filters(patterns: &[String]) -> Result<Vec<Regex>, Error> {
    patterns
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| Ok(Regex::new(p)?))
        .collect()
}
