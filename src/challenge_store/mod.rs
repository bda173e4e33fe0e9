//! Dynamic ACME challenge token storage.
//!
//! Holds the current [RFC-8555][RFC-8555] [DNS-01] validation token for each
//! `_acme-challenge.<domain>` name. Tokens are transient: publishing a new token for a name
//! replaces the old one, and nothing is persisted across restarts.
//!
//! Every [`Nameserver`][crate::dns::Nameserver] owns its own store. Queries read it while the
//! [`ChallengeBridge`][crate::bridge::ChallengeBridge] writes to it, so all access goes through
//! the [`RwLock`] in [`DynTokenStore`].
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4

use crate::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;
use trust_dns_server::client::rr::LowerName;

pub mod memory;

#[allow(clippy::module_name_repetitions)]
pub use memory::InMemoryTokenStore;

/// `DynTokenStore` is a type alias for a [`TokenStore`] that can be used by multiple read/write
/// consumers that coordinate through an [`Arc`] and a [`RwLock`] wrapping the [`TokenStore`].
#[allow(clippy::module_name_repetitions)]
pub type DynTokenStore = Arc<RwLock<dyn TokenStore + Send + Sync>>;

/// A new, empty in-memory [`DynTokenStore`].
pub fn new_shared() -> DynTokenStore {
    Arc::new(RwLock::new(InMemoryTokenStore::default()))
}

/// An async trait describing storage of the current DNS-01 token per challenge name.
#[async_trait::async_trait]
pub trait TokenStore {
    /// Set the token for the given fully qualified challenge name, replacing any previous one.
    async fn set_token(&mut self, fqdn: LowerName, token: String) -> Result<(), Error>;

    /// Get the current token for the given challenge name (if any).
    async fn token(&self, fqdn: &LowerName) -> Option<String>;
}
