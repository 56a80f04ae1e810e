// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Symmetric encryption of datastore plaintext.
//!
//! ## Token Format
//!
//! ```text
//! base64url_unpadded( version (1) | nonce (12) | ciphertext | tag (16) )
//! ```
//!
//! AES-256-GCM with a random nonce per token. The version byte is also bound
//! as associated data.

use std::fmt;

use base64ct::{Base64Url, Base64UrlUnpadded, Encoding};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};

/// Key length in bytes.
pub const KEY_LEN: usize = 32;

const TOKEN_VERSION: u8 = 0x01;
const TAG_LEN: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid datastore key: {0}")]
    InvalidKey(String),

    #[error("system random generator failed")]
    Rng,

    #[error("encryption failed")]
    Encrypt,

    /// Anything that is not a token produced under the configured key.
    #[error("invalid token")]
    InvalidToken,
}

/// Process-wide symmetric engine, built once from configuration.
pub struct CryptoEngine {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl CryptoEngine {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        let unbound = UnboundKey::new(&AES_256_GCM, key)
            .map_err(|_| CryptoError::InvalidKey("rejected by AES-256-GCM".to_string()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Build from url-safe base64 text, padded or not.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let trimmed = encoded.trim().trim_end_matches('=');
        let key = Base64UrlUnpadded::decode_vec(trimmed)
            .map_err(|e| CryptoError::InvalidKey(format!("not url-safe base64: {e}")))?;
        Self::new(&key)
    }

    /// A fresh random key, url-safe base64 with padding.
    pub fn generate_key() -> Result<String, CryptoError> {
        let mut key = [0u8; KEY_LEN];
        SystemRandom::new()
            .fill(&mut key)
            .map_err(|_| CryptoError::Rng)?;
        Ok(Base64Url::encode_string(&key))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        self.rng.fill(&mut nonce).map_err(|_| CryptoError::Rng)?;

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce),
                Aad::from([TOKEN_VERSION]),
                &mut in_out,
            )
            .map_err(|_| CryptoError::Encrypt)?;

        let mut token = Vec::with_capacity(1 + NONCE_LEN + in_out.len());
        token.push(TOKEN_VERSION);
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&in_out);
        Ok(Base64UrlUnpadded::encode_string(&token))
    }

    pub fn decrypt(&self, token: &str) -> Result<Vec<u8>, CryptoError> {
        let raw = Base64UrlUnpadded::decode_vec(token).map_err(|_| CryptoError::InvalidToken)?;
        if raw.len() < 1 + NONCE_LEN + TAG_LEN || raw[0] != TOKEN_VERSION {
            return Err(CryptoError::InvalidToken);
        }

        let nonce = Nonce::try_assume_unique_for_key(&raw[1..1 + NONCE_LEN])
            .map_err(|_| CryptoError::InvalidToken)?;
        let mut in_out = raw[1 + NONCE_LEN..].to_vec();
        let plaintext_len = self
            .key
            .open_in_place(nonce, Aad::from([TOKEN_VERSION]), &mut in_out)
            .map_err(|_| CryptoError::InvalidToken)?
            .len();
        in_out.truncate(plaintext_len);
        Ok(in_out)
    }
}

impl fmt::Debug for CryptoEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoEngine")
            .field("algorithm", &"AES-256-GCM")
            .field("key", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> CryptoEngine {
        CryptoEngine::from_base64(&CryptoEngine::generate_key().unwrap()).unwrap()
    }

    #[test]
    fn encrypt_then_decrypt() {
        let engine = engine();
        let token = engine.encrypt(b"{\"clients\":[]}").unwrap();

        assert!(!token.contains('='));
        assert_eq!(engine.decrypt(&token).unwrap(), b"{\"clients\":[]}");
    }

    #[test]
    fn tokens_use_fresh_nonces() {
        let engine = engine();
        assert_ne!(engine.encrypt(b"same").unwrap(), engine.encrypt(b"same").unwrap());
    }

    #[test]
    fn wrong_key_is_an_invalid_token() {
        let token = engine().encrypt(b"secret").unwrap();
        assert!(matches!(engine().decrypt(&token), Err(CryptoError::InvalidToken)));
    }

    #[test]
    fn tampered_and_malformed_tokens_are_rejected() {
        let engine = engine();
        let token = engine.encrypt(b"secret").unwrap();

        let mut raw = Base64UrlUnpadded::decode_vec(&token).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = Base64UrlUnpadded::encode_string(&raw);

        for bad in [tampered.as_str(), "", "not base64 !", "AQID"] {
            assert!(
                matches!(engine.decrypt(bad), Err(CryptoError::InvalidToken)),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn keys_are_validated() {
        assert!(matches!(
            CryptoEngine::new(&[0u8; 16]),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            CryptoEngine::from_base64("***"),
            Err(CryptoError::InvalidKey(_))
        ));

        // Padded and unpadded forms of the same key are accepted
        let padded = CryptoEngine::generate_key().unwrap();
        assert!(padded.ends_with('='));
        CryptoEngine::from_base64(&padded).unwrap();
        CryptoEngine::from_base64(padded.trim_end_matches('=')).unwrap();
    }

    #[test]
    fn debug_redacts_key() {
        assert!(format!("{:?}", engine()).contains("<redacted>"));
    }
}
