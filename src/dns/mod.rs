//! Catch-all authoritative DNS server.
//!
//! # Owned Domains
//!
//! The server claims authority over every name equal to, or under, one of the configured
//! [`Config::domains`][`crate::config::Config::domains`]. Names under an owned domain resolve
//! whether or not they were ever configured:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 +short anything.at.all.owned.example A
//! 203.0.113.10
//! ```
//!
//! Synthesized answers always carry a TTL of 1 so resolvers don't hold on to them.
//!
//! | Query | Answer                                                                  |
//! |-------|-------------------------------------------------------------------------|
//! | A     | [`Config::ip`][`crate::config::Config::ip`]                             |
//! | MX    | preference 10, [`Config::default_domain`][`crate::config::Config::default_domain`] |
//! | CNAME | a fresh random label under the default domain, plus its A record        |
//! | TXT   | the published DNS-01 token for `_acme-challenge.<owned name>`           |
//!
//! # Static Records
//!
//! [`Config::records`][`crate::config::Config::records`] lines are served as configured and
//! take precedence in the answer section:
//!
//! ```json
//! {
//!   "records": [
//!     "owned.example. NS ns1.owned.example.",
//!     "ns1.owned.example. 3600 IN A 203.0.113.10",
//!     "owned.example. TXT \"v=spf1 -all\""
//!   ]
//! }
//! ```
//!
//! A name with records of another type but a CNAME is answered with the CNAME.
//!
//! # Negative Answers
//!
//! Names with no records and no synthesized answer get `NXDOMAIN`. When the name falls
//! under an owned domain the response is authoritative and carries the zone SOA:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 nothing.owned.example AAAA
//! ;; ->>HEADER<<- opcode: QUERY, status: NXDOMAIN, id: 4242
//! ;; flags: qr aa rd; QUERY: 1, ANSWER: 0, AUTHORITY: 1, ADDITIONAL: 1
//! ```

pub mod engine;
mod handlers;
pub mod records;
pub mod server;

use crate::error::Error;
use trust_dns_server::client::rr::{LowerName, Name};

pub use engine::{Answer, QueryEngine};
pub use records::RecordStore;
pub use server::{launch, Launched, Nameserver, ServerState};

/// Parse a domain into its fully-qualified, lower-cased form. A missing trailing dot is
/// implied.
///
/// # Errors
///
/// Returns [`Error::InvalidName`] for empty input or anything that isn't a DNS name.
pub fn lower_fqdn(domain: &str) -> Result<LowerName, Error> {
    let trimmed = domain.trim();
    if trimmed.is_empty() || trimmed == "." {
        return Err(Error::InvalidName(domain.to_string()));
    }
    let name = if trimmed.ends_with('.') {
        Name::from_ascii(trimmed)
    } else {
        Name::from_ascii(format!("{trimmed}."))
    };
    name.map(|n| LowerName::from(&n))
        .map_err(|_| Error::InvalidName(domain.to_string()))
}

/// True when `name` equals `zone` or is a subdomain of it, compared label by label.
pub fn in_zone(name: &LowerName, zone: &LowerName) -> bool {
    zone.zone_of(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_fqdn_normalizes() {
        assert_eq!(
            lower_fqdn("WWW.Example.COM").unwrap(),
            lower_fqdn("www.example.com.").unwrap()
        );
        assert!(lower_fqdn("www.example.com").unwrap().is_fqdn());
        assert!(lower_fqdn("_acme-challenge.example.com").is_ok());
        assert!(lower_fqdn("").is_err());
        assert!(lower_fqdn(".").is_err());
    }

    #[test]
    fn in_zone_is_label_aware() {
        let zone = lower_fqdn("owned.com").unwrap();
        assert!(in_zone(&lower_fqdn("owned.com").unwrap(), &zone));
        assert!(in_zone(&lower_fqdn("a.b.owned.com").unwrap(), &zone));
        assert!(!in_zone(&lower_fqdn("notowned.com").unwrap(), &zone));
        assert!(!in_zone(&lower_fqdn("com").unwrap(), &zone));
    }
}
