//! Webhook request authentication.
//!
//! Two accepted credentials: an HMAC-SHA256 signature over the raw body in
//! `X-Hub-Signature-256` (preferred, and checked first when present), or
//! the shared-secret `token` query parameter. All comparisons are constant
//! time. A rejected request must cause no sync side effects.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum WebhookAuthError {
    #[error("no signature header or token provided")]
    MissingCredentials,
    #[error("malformed signature header")]
    MalformedSignature,
    #[error("signature mismatch")]
    InvalidSignature,
    #[error("invalid token")]
    InvalidToken,
}

pub struct WebhookSecurity {
    secret: SecretString,
}

impl WebhookSecurity {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC accepts keys of any length")
    }

    /// Signature header value for a payload. Used by tests and by the
    /// operator docs shown on the services endpoint.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = self.mac();
        mac.update(payload);
        format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
    }

    pub fn verify(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
        url_token: Option<&str>,
    ) -> Result<(), WebhookAuthError> {
        if let Some(header) = signature_header {
            return self.verify_signature(payload, header);
        }
        if let Some(token) = url_token {
            return self.verify_token(token);
        }
        Err(WebhookAuthError::MissingCredentials)
    }

    fn verify_signature(&self, payload: &[u8], header: &str) -> Result<(), WebhookAuthError> {
        let hex_digest = header
            .strip_prefix(SIGNATURE_PREFIX)
            .ok_or(WebhookAuthError::MalformedSignature)?;
        let expected = hex::decode(hex_digest).map_err(|_| WebhookAuthError::MalformedSignature)?;

        let mut mac = self.mac();
        mac.update(payload);
        mac.verify_slice(&expected)
            .map_err(|_| WebhookAuthError::InvalidSignature)
    }

    fn verify_token(&self, token: &str) -> Result<(), WebhookAuthError> {
        let matches: bool = token
            .as_bytes()
            .ct_eq(self.secret.expose_secret().as_bytes())
            .into();
        if matches {
            Ok(())
        } else {
            Err(WebhookAuthError::InvalidToken)
        }
    }
}
