//! Envelope encryption for small secrets.
//!
//! Provider credentials are stored as JSON envelopes of the form
//! `{key_id, nonce, ciphertext}` where `nonce` and `ciphertext` are base64.
//! A [`Keyring`] holds a named set of 32-byte master keys plus the id of the
//! key used for new encryptions. Old envelopes stay readable as long as their
//! key remains in the ring, which makes rotation a deploy-then-reencrypt
//! operation with no downtime.

use std::collections::HashMap;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Errors produced by envelope operations.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("current key id is empty")]
    EmptyCurrentKeyId,

    #[error("keys map is empty")]
    EmptyKeyring,

    #[error("current key id {0:?} not found")]
    CurrentKeyMissing(String),

    #[error("key {id:?} must be {KEY_LEN} bytes, got {len}")]
    InvalidKeyLength { id: String, len: usize },

    #[error("unknown key id {0:?}")]
    UnknownKeyId(String),

    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("envelope json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("aead failure")]
    Aead,
}

/// A sealed secret: which key sealed it, the fresh nonce, and the
/// tag-carrying ciphertext. Serializes losslessly to JSON with base64
/// `nonce` and `ciphertext` fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    pub key_id: String,
    pub nonce: String,
    pub ciphertext: String,
}

/// A named set of 32-byte AES-256-GCM keys with a designated current key.
#[derive(Clone)]
pub struct Keyring {
    current_key_id: String,
    keys: HashMap<String, [u8; KEY_LEN]>,
}

impl Keyring {
    /// Build a keyring. The map must be non-empty, every key must be exactly
    /// 32 bytes, and `current_key_id` must name one of the entries.
    pub fn new(
        current_key_id: impl Into<String>,
        keys: HashMap<String, Vec<u8>>,
    ) -> Result<Self, EnvelopeError> {
        let current_key_id = current_key_id.into();
        if current_key_id.is_empty() {
            return Err(EnvelopeError::EmptyCurrentKeyId);
        }
        if keys.is_empty() {
            return Err(EnvelopeError::EmptyKeyring);
        }
        if !keys.contains_key(&current_key_id) {
            return Err(EnvelopeError::CurrentKeyMissing(current_key_id));
        }

        let mut fixed = HashMap::with_capacity(keys.len());
        for (id, key) in keys {
            let len = key.len();
            let bytes: [u8; KEY_LEN] = key
                .try_into()
                .map_err(|_| EnvelopeError::InvalidKeyLength { id: id.clone(), len })?;
            fixed.insert(id, bytes);
        }

        Ok(Self {
            current_key_id,
            keys: fixed,
        })
    }

    /// Id of the key used for new encryptions.
    pub fn current_key_id(&self) -> &str {
        &self.current_key_id
    }

    /// Encrypt plaintext under the current key with a fresh random nonce.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Envelope, EnvelopeError> {
        let key = &self.keys[&self.current_key_id];
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| EnvelopeError::Aead)?;

        Ok(Envelope {
            key_id: self.current_key_id.clone(),
            nonce: BASE64.encode(nonce_bytes),
            ciphertext: BASE64.encode(ciphertext),
        })
    }

    /// Decrypt an envelope using the key it names. Fails if the key id is
    /// unknown or authentication fails.
    pub fn decrypt(&self, envelope: &Envelope) -> Result<Vec<u8>, EnvelopeError> {
        let key = self
            .keys
            .get(&envelope.key_id)
            .ok_or_else(|| EnvelopeError::UnknownKeyId(envelope.key_id.clone()))?;

        let nonce_bytes = BASE64.decode(&envelope.nonce)?;
        let ciphertext = BASE64.decode(&envelope.ciphertext)?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|_| EnvelopeError::Aead)
    }

    /// Encrypt a string value and serialize the envelope to JSON.
    pub fn seal_string(&self, value: &str) -> Result<String, EnvelopeError> {
        let envelope = self.encrypt(value.as_bytes())?;
        Ok(serde_json::to_string(&envelope)?)
    }

    /// Parse a JSON envelope and decrypt it back to a string.
    pub fn open_string(&self, raw: &str) -> Result<String, EnvelopeError> {
        let envelope: Envelope = serde_json::from_str(raw)?;
        let plaintext = self.decrypt(&envelope)?;
        Ok(String::from_utf8_lossy(&plaintext).into_owned())
    }

    /// Decrypt a stored envelope and seal it again under the current key.
    /// A no-op in effect when the current key already sealed it.
    pub fn reencrypt(&self, raw: &str) -> Result<String, EnvelopeError> {
        let plain = self.open_string(raw)?;
        self.seal_string(&plain)
    }
}
