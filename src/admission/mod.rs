//! On-demand certificate admission.
//!
//! Before a certificate client issues for a hostname it hasn't seen before, it asks
//! [`AdmissionPolicy::should_issue`]. Issuance is only ever allowed for names under the
//! owned domains, never for names matching a [`Config::tls_filters`] pattern, and, when
//! [`Config::tls_upstream_check`] is on, only for rewritten names whose rewrite target
//! actually exists upstream.
//!
//! [`AdmissionPolicy::subject_for`] picks what to put in the certificate: owned apex domains
//! get their own certificate, everything else shares a wildcard for its parent.

pub mod upstream;

use crate::config::Config;
use crate::error::Error;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
pub use upstream::{UpstreamCheck, UpstreamResolver};

pub type DynUpstreamCheck = Arc<dyn UpstreamCheck + Send + Sync>;

/// The outcome of [`AdmissionPolicy::should_issue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// The hostname matched a TLS filter.
    Filtered(String),
    /// The hostname isn't under any owned domain.
    NotOwned,
    /// The rewrite target has no A, AAAA or CNAME record upstream.
    NoUpstreamRecord(String),
    /// The upstream check didn't finish in time.
    UpstreamTimeout(String),
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Filtered(pattern) => {
                write!(f, "not allowed due to tls filter configuration ({pattern})")
            }
            DenyReason::NotOwned => f.write_str("not allowed"),
            DenyReason::NoUpstreamRecord(target) => {
                write!(f, "no valid upstream record found for domain {target}")
            }
            DenyReason::UpstreamTimeout(target) => {
                write!(f, "upstream check for domain {target} timed out")
            }
        }
    }
}

#[derive(Clone)]
pub struct AdmissionPolicy {
    domains: Vec<String>,
    filters: Vec<Regex>,
    rewrites: Vec<(String, String)>,
    upstream_check: Option<DynUpstreamCheck>,
    upstream_timeout: Duration,
}

impl AdmissionPolicy {
    /// Build the policy from the configuration, checking upstream with an
    /// [`UpstreamResolver`] when [`Config::tls_upstream_check`] is on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilter`] if a TLS filter isn't a valid regex.
    pub fn from_config(config: &Config) -> Result<Self, Error> {
        let upstream: Option<DynUpstreamCheck> = if config.tls_upstream_check {
            Some(Arc::new(UpstreamResolver::new(
                config.upstream_resolver,
                config.upstream_timeout,
            )))
        } else {
            None
        };
        Self::with_upstream(config, upstream)
    }

    /// Like [`AdmissionPolicy::from_config`], with an explicit upstream checker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFilter`] if a TLS filter isn't a valid regex.
    pub fn with_upstream(
        config: &Config,
        upstream_check: Option<DynUpstreamCheck>,
    ) -> Result<Self, Error> {
        let mut rewrites: Vec<(String, String)> = config
            .rewrites
            .iter()
            .map(|(from, to)| (normalize(from), normalize(to)))
            .collect();
        // Longest match first, so overlapping rewrites resolve the same way every time.
        rewrites.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Ok(Self {
            domains: config.domains.iter().map(|d| normalize(d)).collect(),
            filters: config.tls_filters()?,
            rewrites,
            upstream_check,
            upstream_timeout: config.upstream_timeout,
        })
    }

    pub async fn should_issue(&self, hostname: &str) -> Decision {
        let decision = self.decide(hostname).await;
        match &decision {
            Decision::Allow => info!(hostname, "certificate issuance allowed"),
            Decision::Deny(reason) => {
                info!(hostname, reason = %reason, "certificate issuance denied");
            }
        }
        decision
    }

    async fn decide(&self, hostname: &str) -> Decision {
        if let Some(filter) = self.filters.iter().find(|f| f.is_match(hostname)) {
            return Decision::Deny(DenyReason::Filtered(filter.as_str().to_string()));
        }

        let name = normalize(hostname);
        if !self.domains.iter().any(|domain| is_under(&name, domain)) {
            return Decision::Deny(DenyReason::NotOwned);
        }

        let (Some(upstream), Some(target)) = (&self.upstream_check, self.rewrite(&name)) else {
            return Decision::Allow;
        };
        match tokio::time::timeout(self.upstream_timeout, upstream.exists(&target)).await {
            Ok(true) => Decision::Allow,
            Ok(false) => Decision::Deny(DenyReason::NoUpstreamRecord(target)),
            Err(_) => Decision::Deny(DenyReason::UpstreamTimeout(target)),
        }
    }

    /// The rewritten target for `hostname`, if a rewrite applies to it. The last occurrence of
    /// the matching source domain is replaced.
    pub fn rewrite(&self, hostname: &str) -> Option<String> {
        let name = normalize(hostname);
        self.rewrites.iter().find_map(|(from, to)| {
            if !is_under(&name, from) {
                return None;
            }
            let at = name.rfind(from.as_str())?;
            Some(format!("{}{}{}", &name[..at], to, &name[at + from.len()..]))
        })
    }

    /// The certificate subject to request for `hostname`: the name itself for an owned apex,
    /// otherwise a wildcard covering its siblings.
    pub fn subject_for(&self, hostname: &str) -> String {
        let name = normalize(hostname);
        if self.domains.iter().any(|domain| *domain == name) {
            return name;
        }
        match name.split_once('.') {
            Some((_, parent)) => format!("*.{parent}"),
            None => name,
        }
    }

    /// Wildcard subjects for every owned domain, for the certificate client to provision up
    /// front.
    pub fn managed_subjects(&self) -> Vec<String> {
        self.domains.iter().map(|d| format!("*.{d}")).collect()
    }
}

fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn is_under(name: &str, domain: &str) -> bool {
    name == domain
        || name
            .strip_suffix(domain)
            .map_or(false, |prefix| prefix.ends_with('.'))
}
