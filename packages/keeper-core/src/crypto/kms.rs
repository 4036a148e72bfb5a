//! # Key Management Service
//!
//! Holds the master key (KEK) and mints/unwraps per-secret data keys (DEKs).
//!
//! The KEK never touches disk in the clear: at startup it is read from a file
//! containing its RSA-OAEP-SHA256 ciphertext and unwrapped with a PKCS8 PEM
//! private key read from a second file. From then on it lives only in process
//! memory (zeroized on drop). Data keys leave the process exclusively in
//! wrapped form (AES-256-GCM under the KEK, nonce prepended).

use std::path::Path;

use rsa::{pkcs8::DecodePrivateKey, Oaep, RsaPrivateKey};
use sha2::Sha256;

use super::{open, seal, SymmetricKey, KEY_SIZE};
use crate::error::{Error, Result};

/// Key Management Service: one KEK, two operations.
pub struct Kms {
    kek: SymmetricKey,
}

impl Kms {
    /// Load the KEK by unwrapping `encrypted_key_path` (raw RSA-OAEP bytes)
    /// with the PKCS8 PEM private key at `master_key_path`.
    pub fn load(master_key_path: &Path, encrypted_key_path: &Path) -> Result<Self> {
        let pem = std::fs::read_to_string(master_key_path)?;
        let private_key = RsaPrivateKey::from_pkcs8_pem(&pem)
            .map_err(|e| Error::MasterKey(format!("cannot parse private key: {e}")))?;

        let wrapped = std::fs::read(encrypted_key_path)?;
        let kek = private_key
            .decrypt(Oaep::new::<Sha256>(), &wrapped)
            .map_err(|e| Error::MasterKey(format!("cannot unwrap encryption key: {e}")))?;

        let kek: [u8; KEY_SIZE] = kek
            .try_into()
            .map_err(|_| Error::MasterKey("encryption key is not 32 bytes".into()))?;

        Ok(Self {
            kek: SymmetricKey::from_bytes(kek),
        })
    }

    /// Build a KMS around a raw KEK. Lets tests and provisioning tooling skip
    /// the RSA file pair.
    pub fn from_raw_key(kek: [u8; KEY_SIZE]) -> Self {
        Self {
            kek: SymmetricKey::from_bytes(kek),
        }
    }

    /// Mint a fresh random 32-byte data key.
    ///
    /// Returns the plaintext key for immediate use and its wrapped form for
    /// persistence alongside the secret.
    pub fn generate_data_key(&self) -> Result<(SymmetricKey, Vec<u8>)> {
        let data_key = SymmetricKey::random();
        let wrapped = seal(&self.kek, data_key.as_bytes())?;
        Ok((data_key, wrapped))
    }

    /// Unwrap a previously generated data key.
    pub fn unwrap_data_key(&self, wrapped: &[u8]) -> Result<SymmetricKey> {
        let bytes = open(&self.kek, wrapped).ok_or(Error::KmsUnwrap)?;
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| Error::KmsUnwrap)?;
        Ok(SymmetricKey::from_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};
    use rsa::RsaPublicKey;

    fn test_kms() -> Kms {
        Kms::from_raw_key([7u8; KEY_SIZE])
    }

    #[test]
    fn test_data_key_round_trip() {
        let kms = test_kms();
        let (plain, wrapped) = kms.generate_data_key().unwrap();

        assert!(!wrapped.is_empty());
        // The wrapped form never contains the raw key bytes.
        assert!(!wrapped
            .windows(KEY_SIZE)
            .any(|w| w == plain.as_bytes().as_slice()));

        let unwrapped = kms.unwrap_data_key(&wrapped).unwrap();
        assert_eq!(unwrapped.as_bytes(), plain.as_bytes());
    }

    #[test]
    fn test_data_keys_are_unique() {
        let kms = test_kms();
        let (a, _) = kms.generate_data_key().unwrap();
        let (b, _) = kms.generate_data_key().unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_unwrap_rejects_tampered_key() {
        let kms = test_kms();
        let (_, mut wrapped) = kms.generate_data_key().unwrap();
        wrapped[0] ^= 0xFF;
        assert!(matches!(
            kms.unwrap_data_key(&wrapped),
            Err(Error::KmsUnwrap)
        ));
    }

    #[test]
    fn test_unwrap_rejects_short_input() {
        let kms = test_kms();
        assert!(matches!(kms.unwrap_data_key(&[1, 2, 3]), Err(Error::KmsUnwrap)));
    }

    #[test]
    fn test_unwrap_with_wrong_kek_fails() {
        let kms = test_kms();
        let (_, wrapped) = kms.generate_data_key().unwrap();
        let other = Kms::from_raw_key([8u8; KEY_SIZE]);
        assert!(other.unwrap_data_key(&wrapped).is_err());
    }

    #[test]
    fn test_load_from_key_files() {
        // Provision the two files the way an operator would: a PKCS8 PEM
        // private key and the KEK wrapped under its public half.
        let mut rng = rand::rngs::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);

        let kek = [9u8; KEY_SIZE];
        let wrapped_kek = public_key
            .encrypt(&mut rng, Oaep::new::<Sha256>(), &kek)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let master_path = dir.path().join("master.pem");
        let encrypted_path = dir.path().join("kek.bin");
        std::fs::write(
            &master_path,
            private_key.to_pkcs8_pem(LineEnding::LF).unwrap().as_bytes(),
        )
        .unwrap();
        std::fs::write(&encrypted_path, &wrapped_kek).unwrap();

        let kms = Kms::load(&master_path, &encrypted_path).unwrap();
        let (plain, wrapped) = kms.generate_data_key().unwrap();
        assert_eq!(
            kms.unwrap_data_key(&wrapped).unwrap().as_bytes(),
            plain.as_bytes()
        );

        // Same wrapped DEK unwraps under an identical KEK loaded directly.
        let direct = Kms::from_raw_key(kek);
        assert_eq!(
            direct.unwrap_data_key(&wrapped).unwrap().as_bytes(),
            plain.as_bytes()
        );
    }
}
