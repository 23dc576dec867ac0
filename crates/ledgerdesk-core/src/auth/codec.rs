//! Obfuscated encoding of the persisted user record.
//!
//! The record is serialized to JSON, sealed with ChaCha20-Poly1305 under a
//! key stretched from the configured storage secret, and stored as
//! `base64(nonce || ciphertext)`.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use thiserror::Error;

use super::UserRecord;

/// Fixed salt; the secret alone distinguishes installations.
const KEY_SALT: &[u8] = b"ledgerdesk.userData.v1";

const NONCE_LEN: usize = 12;

/// Argon2 memory cost in KiB. Kept small: this guards against casual
/// inspection of the stored record, not offline brute force.
const KDF_MEMORY_KIB: u32 = 8 * 1024;
const KDF_ITERATIONS: u32 = 2;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Stored session is not valid base64")]
    Encoding(#[from] base64::DecodeError),

    #[error("Stored session is too short")]
    Truncated,

    #[error("Stored session could not be decrypted")]
    Decrypt,

    #[error("Session record could not be encrypted")]
    Encrypt,

    #[error("Session record is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct RecordCodec {
    cipher: ChaCha20Poly1305,
}

impl RecordCodec {
    pub fn new(secret: &str) -> Result<Self, CodecError> {
        let params = Params::new(KDF_MEMORY_KIB, KDF_ITERATIONS, 1, Some(32))
            .map_err(|e| CodecError::KeyDerivation(e.to_string()))?;
        let kdf = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        let mut key = [0u8; 32];
        kdf.hash_password_into(secret.as_bytes(), KEY_SALT, &mut key)
            .map_err(|e| CodecError::KeyDerivation(e.to_string()))?;

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        })
    }

    pub fn encode(&self, record: &UserRecord) -> Result<String, CodecError> {
        let plaintext = serde_json::to_vec(record)?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| CodecError::Encrypt)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    pub fn decode(&self, encoded: &str) -> Result<UserRecord, CodecError> {
        let sealed = STANDARD.decode(encoded.trim())?;
        if sealed.len() <= NONCE_LEN {
            return Err(CodecError::Truncated);
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CodecError::Decrypt)?;

        Ok(serde_json::from_slice(&plaintext)?)
    }
}

impl std::fmt::Debug for RecordCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCodec").finish_non_exhaustive()
    }
}
