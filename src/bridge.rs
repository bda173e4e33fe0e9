//! DNS-01 bridge between a certificate client and the running nameservers.
//!
//! A certificate client solving [DNS-01] challenges needs somewhere to put the validation
//! token. [`ChallengeBridge`] writes it into the [`TokenStore`] of every
//! [`Nameserver`][crate::dns::Nameserver], so a query over either transport sees the same
//! value as soon as [`Dns01Provider::present`] returns.
//!
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
//! [`TokenStore`]: crate::challenge_store::TokenStore

use crate::challenge_store::DynTokenStore;
use crate::dns::lower_fqdn;
use crate::error::Error;
use std::sync::Arc;
use trust_dns_server::client::rr::LowerName;

const ACME_CHALLENGE_PREFIX: &str = "_acme-challenge.";

/// The callback contract of an ACME DNS-01 solver.
#[async_trait::async_trait]
pub trait Dns01Provider {
    /// Make `token` available as the TXT answer for `record_name`. Idempotent.
    async fn present(&self, record_name: &str, token: &str) -> Result<(), Error>;

    /// Withdraw the token for `record_name`.
    async fn clean_up(&self, record_name: &str) -> Result<(), Error>;

    /// Wait until a presented token can be observed.
    async fn wait(&self, record_name: &str) -> Result<(), Error>;
}

#[derive(Clone)]
pub struct ChallengeBridge {
    stores: Arc<[DynTokenStore]>,
}

impl ChallengeBridge {
    /// Create a bridge over the token stores of every running nameserver.
    pub fn new(stores: Vec<DynTokenStore>) -> Self {
        Self {
            stores: stores.into(),
        }
    }

    /// Publish the DNS-01 token for `domain` under `_acme-challenge.<domain>`. A wildcard
    /// domain (`*.example.com`) is validated at `_acme-challenge.example.com`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidName`] if `domain` isn't a valid DNS name.
    pub async fn publish(&self, domain: &str, token: &str) -> Result<(), Error> {
        let domain = domain.strip_prefix("*.").unwrap_or(domain);
        self.present(&format!("{ACME_CHALLENGE_PREFIX}{domain}"), token)
            .await
    }

    /// Withdrawing is a no-op: tokens are short-lived and replaced by the next publish.
    #[allow(clippy::unused_async)]
    pub async fn withdraw(&self, domain: &str) {
        tracing::debug!(domain, "challenge withdraw ignored");
    }

    /// Number of nameservers the bridge publishes to.
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    async fn set_everywhere(&self, fqdn: LowerName, token: &str) -> Result<(), Error> {
        for store in self.stores.iter() {
            store
                .write()
                .await
                .set_token(fqdn.clone(), token.to_string())
                .await?;
        }
        tracing::info!(record = %fqdn, servers = self.stores.len(), "challenge token published");
        Ok(())
    }
}

#[async_trait::async_trait]
impl Dns01Provider for ChallengeBridge {
    async fn present(&self, record_name: &str, token: &str) -> Result<(), Error> {
        self.set_everywhere(lower_fqdn(record_name)?, token).await
    }

    async fn clean_up(&self, record_name: &str) -> Result<(), Error> {
        self.withdraw(record_name).await;
        Ok(())
    }

    // Tokens are answerable as soon as present returns.
    async fn wait(&self, _record_name: &str) -> Result<(), Error> {
        Ok(())
    }
}
