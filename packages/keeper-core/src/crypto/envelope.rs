//! # Envelope Cipher
//!
//! Authenticated encryption of arbitrary byte buffers under a per-secret data
//! key. The first field of a secret mints a fresh DEK via the KMS; any
//! further field of the same secret (a card's CVC after its number, binary
//! chunks after chunk 0) reuses that DEK through [`EnvelopeCipher::encrypt_with_key`],
//! always with an independent random nonce.

use std::sync::Arc;

use super::{open, seal, Kms};
use crate::error::{Error, Result};

/// Envelope encryption over the KMS.
pub struct EnvelopeCipher {
    kms: Arc<Kms>,
}

impl EnvelopeCipher {
    pub fn new(kms: Arc<Kms>) -> Self {
        Self { kms }
    }

    /// Encrypt `plaintext` under a freshly minted data key.
    ///
    /// Returns `(nonce‖ciphertext‖tag, wrapped_key)`; the wrapped key is what
    /// gets persisted in the secret's metadata.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let (data_key, wrapped) = self.kms.generate_data_key()?;
        let ciphertext = seal(&data_key, plaintext)?;
        Ok((ciphertext, wrapped))
    }

    /// Encrypt another buffer under an already-established data key.
    pub fn encrypt_with_key(&self, plaintext: &[u8], wrapped_key: &[u8]) -> Result<Vec<u8>> {
        let data_key = self.kms.unwrap_data_key(wrapped_key)?;
        seal(&data_key, plaintext)
    }

    /// Decrypt a buffer produced by [`encrypt`](Self::encrypt) or
    /// [`encrypt_with_key`](Self::encrypt_with_key).
    pub fn decrypt(&self, ciphertext: &[u8], wrapped_key: &[u8]) -> Result<Vec<u8>> {
        let data_key = self.kms.unwrap_data_key(wrapped_key)?;
        open(&data_key, ciphertext)
            .ok_or_else(|| Error::Decryption("authentication tag mismatch".into()))
    }
}
