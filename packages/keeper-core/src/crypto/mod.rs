//! # Cryptography
//!
//! AES-256-GCM primitives shared by the KMS and the envelope cipher.
//!
//! Every sealed buffer in Keeper uses the same layout:
//!
//! ```text
//! ┌────────────┬──────────────────────────────┬────────────┐
//! │ nonce (12) │ ciphertext (len = plaintext) │  tag (16)  │
//! └────────────┴──────────────────────────────┴────────────┘
//! ```
//!
//! Nonces are random per call. Random 96-bit nonces are safe for up to 2^32
//! messages per key; each data key protects the handful of fields of a single
//! secret, so the bound is never approached.

mod envelope;
mod kms;

pub use envelope::EnvelopeCipher;
pub use kms::Kms;

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of master and data keys in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// A 256-bit symmetric key, wiped from memory when dropped.
///
/// Used both for the master key (KEK) held for the process lifetime and for
/// the per-secret data keys (DEKs) that exist only transiently between unwrap
/// and use.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Fresh key from the OS CSPRNG.
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

/// Generate a random 96-bit nonce.
fn random_nonce() -> [u8; NONCE_SIZE] {
    let mut bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Seal `plaintext` under `key`, prepending the random nonce.
pub(crate) fn seal(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Encryption(format!("invalid key: {e}")))?;

    let nonce = random_nonce();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| Error::Encryption(format!("seal failed: {e}")))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a `nonce‖ciphertext‖tag` buffer. `None` on tag mismatch or if the
/// input is too short to contain a nonce and a tag; callers attach their own
/// error so KMS and envelope failures stay distinguishable.
pub(crate) fn open(key: &SymmetricKey, data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < NONCE_SIZE + TAG_SIZE {
        return None;
    }
    let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).ok()?;
    cipher.decrypt(Nonce::from_slice(nonce), ciphertext).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_round_trip() {
        let key = SymmetricKey::from_bytes([42u8; KEY_SIZE]);
        let sealed = seal(&key, b"hello").unwrap();
        assert_eq!(sealed.len(), NONCE_SIZE + 5 + TAG_SIZE);
        assert_eq!(open(&key, &sealed).unwrap(), b"hello");
    }

    #[test]
    fn test_open_rejects_tampering() {
        let key = SymmetricKey::from_bytes([42u8; KEY_SIZE]);
        let mut sealed = seal(&key, b"hello").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(open(&key, &sealed).is_none());
    }

    #[test]
    fn test_open_rejects_short_input() {
        let key = SymmetricKey::from_bytes([42u8; KEY_SIZE]);
        assert!(open(&key, &[0u8; NONCE_SIZE - 1]).is_none());
        assert!(open(&key, &[]).is_none());
    }

    #[test]
    fn test_random_keys_differ() {
        let a = SymmetricKey::random();
        let b = SymmetricKey::random();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
