use crate::challenge_store::TokenStore;
use crate::error::Error;
use std::collections::HashMap;
use trust_dns_server::client::rr::LowerName;

#[derive(Default, Debug, Clone)]
pub struct InMemoryTokenStore {
    tokens: HashMap<LowerName, String>,
}

#[async_trait::async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn set_token(&mut self, fqdn: LowerName, token: String) -> Result<(), Error> {
        if !fqdn.is_fqdn() {
            return Err(Error::NotFQDN(fqdn));
        }
        self.tokens.insert(fqdn, token);
        Ok(())
    }

    async fn token(&self, fqdn: &LowerName) -> Option<String> {
        self.tokens.get(fqdn).cloned()
    }
}
