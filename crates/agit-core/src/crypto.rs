//! Field-level encryption of state blobs.
//!
//! When a key is installed, `memory` and `world_state` are each encrypted
//! with AES-256-GCM under a fresh random nonce and stored as
//! `"ENC:" + base64(nonce || ciphertext)`. Commit ids hash the stored
//! (encrypted) bytes. Decryption is authenticated; a payload that fails
//! authentication is reported as corrupted, never returned as garbage.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::Value;
use sha2::{Digest, Sha256};

use agit_state::canonical;

use crate::error::{AgitError, Result};

/// Marker prefix of an encrypted field on the wire.
pub const ENC_PREFIX: &str = "ENC:";

const NONCE_LEN: usize = 12;

/// `true` when `value` is an encrypted-field wrapper.
pub fn is_encrypted_field(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.starts_with(ENC_PREFIX))
}

/// AES-256-GCM cipher for state fields. The key is derived from the
/// installed key string via SHA-256.
#[derive(Clone)]
pub struct StateCipher {
    cipher: Aes256Gcm,
}

impl StateCipher {
    /// Derive a cipher from a key string.
    pub fn new(key: &str) -> Result<Self> {
        let key_bytes = Sha256::digest(key.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| AgitError::Storage(format!("cipher init: {e}")))?;
        Ok(StateCipher { cipher })
    }

    /// Encrypt one field value into its `ENC:` wrapper.
    pub fn encrypt_field(&self, value: &Value) -> Result<String> {
        let plaintext = canonical::to_canonical_bytes(value)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| AgitError::Storage("field encryption failed".to_string()))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce);
        payload.extend_from_slice(&ciphertext);
        Ok(format!("{ENC_PREFIX}{}", BASE64.encode(payload)))
    }

    /// Decrypt one `ENC:` wrapper back into its field value.
    ///
    /// `blob_id` is only used for error context.
    pub fn decrypt_field(&self, wrapped: &str, blob_id: &str) -> Result<Value> {
        let encoded = wrapped.strip_prefix(ENC_PREFIX).ok_or_else(|| {
            AgitError::InvalidInput("field is not an encrypted payload".to_string())
        })?;
        let payload = BASE64.decode(encoded).map_err(|e| AgitError::Corrupted {
            id: blob_id.to_string(),
            detail: format!("encrypted field is not valid base64: {e}"),
        })?;
        if payload.len() < NONCE_LEN {
            return Err(AgitError::Corrupted {
                id: blob_id.to_string(),
                detail: "encrypted field shorter than its nonce".to_string(),
            });
        }

        let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| AgitError::Corrupted {
                id: blob_id.to_string(),
                detail: "authenticated decryption failed".to_string(),
            })?;

        serde_json::from_slice(&plaintext).map_err(|e| AgitError::Corrupted {
            id: blob_id.to_string(),
            detail: format!("decrypted field is not valid JSON: {e}"),
        })
    }
}
