//! Encryptor and decryptor stages.
//!
//! The encryptor populates `encrypted_data_key` and replaces plaintext
//! fields with ciphertext in place; the decryptor is its mirror. A card's
//! CVC is encrypted under the same data key as its number, and a binary
//! chunk reuses the key established by chunk 0 of the same upload.

use std::sync::Arc;

use async_trait::async_trait;

use keeper_core::crypto::EnvelopeCipher;
use keeper_core::error::{Error, Result};
use keeper_core::model::{Binary, Card, Login, Note, SecretVisitor};

use super::Stage;

/// Replaces plaintext fields with ciphertext and records the wrapped DEK.
pub struct Encryptor {
    cipher: Arc<EnvelopeCipher>,
}

impl Encryptor {
    pub fn new(cipher: Arc<EnvelopeCipher>) -> Self {
        Self { cipher }
    }
}

#[async_trait]
impl SecretVisitor for Encryptor {
    async fn visit_login(&mut self, login: &mut Login) -> Result<()> {
        let (ciphertext, wrapped) = self.cipher.encrypt(&login.password)?;
        login.meta.encrypted_data_key = wrapped;
        login.password = ciphertext;
        Ok(())
    }

    async fn visit_card(&mut self, card: &mut Card) -> Result<()> {
        let (number_ct, wrapped) = self.cipher.encrypt(&card.number)?;
        let cvc_ct = self.cipher.encrypt_with_key(&card.cvc, &wrapped)?;
        card.meta.encrypted_data_key = wrapped;
        card.number = number_ct;
        card.cvc = cvc_ct;
        Ok(())
    }

    async fn visit_note(&mut self, note: &mut Note) -> Result<()> {
        let (ciphertext, wrapped) = self.cipher.encrypt(&note.text)?;
        note.meta.encrypted_data_key = wrapped;
        note.text = ciphertext;
        Ok(())
    }

    async fn visit_binary(&mut self, binary: &mut Binary) -> Result<()> {
        // The terminal record carries no payload.
        let Some(data) = binary.data.take() else {
            return Ok(());
        };

        let ciphertext = if binary.meta.encrypted_data_key.is_empty() {
            let (ciphertext, wrapped) = self.cipher.encrypt(&data)?;
            binary.meta.encrypted_data_key = wrapped;
            ciphertext
        } else {
            self.cipher
                .encrypt_with_key(&data, &binary.meta.encrypted_data_key)?
        };

        binary.data = Some(ciphertext);
        Ok(())
    }
}

impl Stage for Encryptor {
    fn name(&self) -> &'static str {
        "encryptor"
    }
}

/// Mirror of [`Encryptor`]: overwrites ciphertext fields with plaintext
/// using the stored `encrypted_data_key`.
pub struct Decryptor {
    cipher: Arc<EnvelopeCipher>,
}

impl Decryptor {
    pub fn new(cipher: Arc<EnvelopeCipher>) -> Self {
        Self { cipher }
    }
}

#[async_trait]
impl SecretVisitor for Decryptor {
    async fn visit_login(&mut self, login: &mut Login) -> Result<()> {
        login.password = self
            .cipher
            .decrypt(&login.password, &login.meta.encrypted_data_key)?;
        Ok(())
    }

    async fn visit_card(&mut self, card: &mut Card) -> Result<()> {
        let key = &card.meta.encrypted_data_key;
        card.number = self.cipher.decrypt(&card.number, key)?;
        card.cvc = self.cipher.decrypt(&card.cvc, key)?;
        Ok(())
    }

    async fn visit_note(&mut self, note: &mut Note) -> Result<()> {
        note.text = self.cipher.decrypt(&note.text, &note.meta.encrypted_data_key)?;
        Ok(())
    }

    async fn visit_binary(&mut self, binary: &mut Binary) -> Result<()> {
        let Some(data) = binary.data.take() else {
            return Ok(());
        };
        if binary.meta.encrypted_data_key.is_empty() {
            return Err(Error::Decryption("missing data key for binary chunk".into()));
        }
        binary.data = Some(self.cipher.decrypt(&data, &binary.meta.encrypted_data_key)?);
        Ok(())
    }
}

impl Stage for Decryptor {
    fn name(&self) -> &'static str {
        "decryptor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_core::crypto::Kms;
    use keeper_core::model::SecretMetadata;

    fn stages() -> (Encryptor, Decryptor) {
        let cipher = Arc::new(EnvelopeCipher::new(Arc::new(Kms::from_raw_key([1u8; 32]))));
        (Encryptor::new(cipher.clone()), Decryptor::new(cipher))
    }

    #[tokio::test]
    async fn test_login_encrypt_decrypt_identity() {
        let (mut enc, mut dec) = stages();
        let mut login =
            Login::new(SecretMetadata::new("login0")).with_credentials("leo", b"secret".to_vec());

        enc.visit_login(&mut login).await.unwrap();
        assert_ne!(login.password, b"secret");
        assert!(!login.meta.encrypted_data_key.is_empty());

        dec.visit_login(&mut login).await.unwrap();
        assert_eq!(login.password, b"secret");
    }

    #[tokio::test]
    async fn test_binary_chunks_reuse_chunk_zero_key() {
        let (mut enc, mut dec) = stages();

        let mut chunk0 = Binary::new(SecretMetadata::new("file.bin")).with_chunk(0, b"aaaa".to_vec());
        enc.visit_binary(&mut chunk0).await.unwrap();
        let key = chunk0.meta.encrypted_data_key.clone();
        assert!(!key.is_empty());

        // Subsequent chunk arrives with the established key and must not
        // mint a new one.
        let mut chunk1 = Binary::new(SecretMetadata::new("file.bin").with_data_key(key.clone()))
            .with_chunk(1, b"bbbb".to_vec());
        enc.visit_binary(&mut chunk1).await.unwrap();
        assert_eq!(chunk1.meta.encrypted_data_key, key);

        dec.visit_binary(&mut chunk1).await.unwrap();
        assert_eq!(chunk1.data.as_deref(), Some(b"bbbb".as_slice()));
    }

    #[tokio::test]
    async fn test_terminal_binary_is_untouched() {
        let (mut enc, mut dec) = stages();
        let mut terminal = Binary::new(SecretMetadata::new("file.bin")).with_summary(3, "hash");

        enc.visit_binary(&mut terminal).await.unwrap();
        assert!(terminal.data.is_none());
        assert!(terminal.meta.encrypted_data_key.is_empty());

        dec.visit_binary(&mut terminal).await.unwrap();
        assert!(terminal.data.is_none());
    }
}
