use base64::engine::general_purpose;
use base64::{alphabet, engine, DecodeError, Engine};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Debug, Clone, Default, Eq, PartialEq)]
pub(super) struct AskQuery {
    pub domain: String,
}

#[derive(Serialize, Debug, Clone, Default, Eq, PartialEq)]
pub(super) struct AskResult {
    pub subject: String,
}

#[derive(Deserialize, Debug, Clone, Default, Ord, PartialOrd, Eq, PartialEq)]
pub(super) struct PresentRequest {
    pub domain: String,
    pub token: String,
}

#[derive(Serialize, Debug, Clone, Default, Ord, PartialOrd, Eq, PartialEq)]
pub(super) struct PresentResult {
    pub record: String,
    pub token: String,
}

#[derive(Deserialize, Debug, Clone, Default, Eq, PartialEq)]
pub(super) struct CleanupRequest {
    pub domain: String,
}

#[derive(thiserror::Error, Debug)]
pub enum TokenValidationError {
    #[error("invalid encoding: {0}")]
    InvalidEncoding(DecodeError),
    #[error("invalid decoded length: found {actual} bytes, expected {expected}")]
    InvalidDecodedLength { actual: usize, expected: usize },
}

const DNS01_DECODED_LEN_BYTES: usize = 32;

lazy_static! {
    static ref BASE64_ENGINE: engine::GeneralPurpose =
        engine::GeneralPurpose::new(&alphabet::URL_SAFE, general_purpose::NO_PAD);
}

impl PresentRequest {
    pub fn valid_dns01(&self) -> Result<(), TokenValidationError> {
        let raw = BASE64_ENGINE
            .decode(&self.token)
            .map_err(TokenValidationError::InvalidEncoding)?;
        if raw.len() == DNS01_DECODED_LEN_BYTES {
            Ok(())
        } else {
            Err(TokenValidationError::InvalidDecodedLength {
                actual: raw.len(),
                expected: DNS01_DECODED_LEN_BYTES,
            })
        }
    }

    /// The TXT record name the token is published under.
    pub fn record_name(&self) -> String {
        let domain = self.domain.strip_prefix("*.").unwrap_or(&self.domain);
        format!("_acme-challenge.{}", domain.trim_end_matches('.').to_ascii_lowercase())
    }
}
