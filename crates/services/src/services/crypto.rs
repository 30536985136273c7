//! Field encryption and blind indexing for sensitive cache columns.
//!
//! Ragic holds these values in plain text for admin visibility; the local
//! cache stores AES-256-GCM ciphertext plus a deterministic HMAC blind
//! index so exact-match lookups never require decrypting the table.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, Error)]
pub enum CryptoError {
    #[error("invalid {name}: expected base64 of 32 bytes")]
    InvalidKey { name: &'static str },
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
    #[error("malformed ciphertext token")]
    Malformed,
}

pub struct FieldCipher {
    cipher: Aes256Gcm,
    index_key: [u8; 32],
}

impl FieldCipher {
    /// Both keys are 32 bytes, base64 encoded, from the environment.
    pub fn new(encryption_key_b64: &str, index_key_b64: &str) -> Result<Self, CryptoError> {
        let enc_key = decode_key(encryption_key_b64, "FIELD_ENCRYPTION_KEY")?;
        let index_key = decode_key(index_key_b64, "BLIND_INDEX_KEY")?;

        Ok(Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&enc_key)),
            index_key,
        })
    }

    /// Encrypt one field value. Output is base64(nonce || ciphertext); a
    /// fresh nonce per call means equal plaintexts never produce equal
    /// tokens, which is why lookups go through the blind index instead.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;

        let mut token = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(token))
    }

    pub fn decrypt(&self, token: &str) -> Result<String, CryptoError> {
        let raw = BASE64.decode(token).map_err(|_| CryptoError::Malformed)?;
        if raw.len() <= NONCE_LEN {
            return Err(CryptoError::Malformed);
        }
        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
    }

    /// Deterministic hash of a sensitive value for exact-match queries.
    /// Input is normalized (trimmed, lowercased) so lookups are tolerant of
    /// the casing Ragic happens to store.
    pub fn blind_index(&self, value: &str) -> String {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.index_key)
            .expect("HMAC accepts keys of any length");
        mac.update(value.trim().to_lowercase().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn decode_key(encoded: &str, name: &'static str) -> Result<[u8; 32], CryptoError> {
    let raw = BASE64
        .decode(encoded.trim())
        .map_err(|_| CryptoError::InvalidKey { name })?;
    raw.try_into().map_err(|_| CryptoError::InvalidKey { name })
}
