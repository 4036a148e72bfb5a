//! # Processing Pipeline
//!
//! Every secret operation is an ordered chain of stages applied to one
//! secret. A stage is a [`SecretVisitor`] plus a result accessor, and the
//! builder composes chains from a small palette:
//!
//! ```text
//! store:    Validator → Encryptor → StorageCreator
//! retrieve: StorageRetriever → Decryptor
//! list:     StorageLister
//! delete:   StorageDeleter
//! ```
//!
//! Writes and reads are mirror images, which makes it hard to forget
//! encryption on a new code path and keeps validation, crypto, and storage
//! decoupled. The first stage that fails aborts the chain with its error;
//! no stage mutates the secret after reporting failure.

mod crypt;
mod store;
mod validate;

pub use crypt::{Decryptor, Encryptor};
pub use store::{StorageCreator, StorageDeleter, StorageLister, StorageRetriever};
pub use validate::Validator;

use std::sync::Arc;

use async_trait::async_trait;

use keeper_core::crypto::EnvelopeCipher;
use keeper_core::error::Result;
use keeper_core::model::{Binary, Card, Login, Note, Secret, SecretVisitor};

use crate::storage::{MetadataStore, ObjectStore};

/// One step of secret processing.
pub trait Stage: SecretVisitor {
    /// Stage name for logs.
    fn name(&self) -> &'static str;

    /// Listing output, populated only by [`StorageLister`].
    fn take_result(&mut self) -> Option<Vec<String>> {
        None
    }
}

// A boxed stage dispatches like the visitor it wraps, so `Secret::accept`
// can run over the erased chain.
#[async_trait]
impl SecretVisitor for Box<dyn Stage> {
    async fn visit_login(&mut self, login: &mut Login) -> Result<()> {
        (**self).visit_login(login).await
    }

    async fn visit_card(&mut self, card: &mut Card) -> Result<()> {
        (**self).visit_card(card).await
    }

    async fn visit_note(&mut self, note: &mut Note) -> Result<()> {
        (**self).visit_note(note).await
    }

    async fn visit_binary(&mut self, binary: &mut Binary) -> Result<()> {
        (**self).visit_binary(binary).await
    }
}

/// An ordered chain of stages.
pub struct Processor {
    stages: Vec<Box<dyn Stage>>,
}

impl Processor {
    /// Run the secret through every stage in order.
    pub async fn process(&mut self, secret: &mut Secret) -> Result<()> {
        for stage in &mut self.stages {
            tracing::debug!(stage = stage.name(), kind = %secret.kind(), path = secret.path(), "stage");
            secret.accept(stage).await.map_err(|err| {
                tracing::debug!(stage = stage.name(), error = %err, "stage failed");
                err
            })?;
        }
        Ok(())
    }

    /// Paths collected by a lister stage, if the chain had one.
    pub fn take_listing(&mut self) -> Option<Vec<String>> {
        self.stages.iter_mut().find_map(|stage| stage.take_result())
    }
}

/// Composes a [`Processor`] from the stage palette.
#[derive(Default)]
pub struct ProcessorBuilder {
    stages: Vec<Box<dyn Stage>>,
}

impl ProcessorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validation(mut self) -> Self {
        self.stages.push(Box::new(Validator::new()));
        self
    }

    pub fn with_encryption(mut self, cipher: Arc<EnvelopeCipher>) -> Self {
        self.stages.push(Box::new(Encryptor::new(cipher)));
        self
    }

    pub fn with_decryption(mut self, cipher: Arc<EnvelopeCipher>) -> Self {
        self.stages.push(Box::new(Decryptor::new(cipher)));
        self
    }

    pub fn with_storage_creator(
        mut self,
        store: Arc<MetadataStore>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        self.stages.push(Box::new(StorageCreator::new(store, objects)));
        self
    }

    pub fn with_storage_retriever(
        mut self,
        store: Arc<MetadataStore>,
        objects: Arc<dyn ObjectStore>,
        owner: &str,
    ) -> Self {
        self.stages
            .push(Box::new(StorageRetriever::new(store, objects, owner)));
        self
    }

    pub fn with_storage_lister(mut self, store: Arc<MetadataStore>, owner: &str) -> Self {
        self.stages.push(Box::new(StorageLister::new(store, owner)));
        self
    }

    pub fn with_storage_deleter(
        mut self,
        store: Arc<MetadataStore>,
        objects: Arc<dyn ObjectStore>,
        owner: &str,
    ) -> Self {
        self.stages
            .push(Box::new(StorageDeleter::new(store, objects, owner)));
        self
    }

    pub fn build(self) -> Processor {
        Processor {
            stages: self.stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::object::memory::MemoryObjectStore;
    use keeper_core::crypto::Kms;
    use keeper_core::model::{Card, Login, Note, Secret, SecretKind, SecretMetadata};

    struct Fixture {
        store: Arc<MetadataStore>,
        objects: Arc<MemoryObjectStore>,
        cipher: Arc<EnvelopeCipher>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: Arc::new(MetadataStore::open(":memory:").unwrap()),
                objects: Arc::new(MemoryObjectStore::new()),
                cipher: Arc::new(EnvelopeCipher::new(Arc::new(Kms::from_raw_key([5u8; 32])))),
            }
        }

        fn write_chain(&self) -> Processor {
            ProcessorBuilder::new()
                .with_validation()
                .with_encryption(self.cipher.clone())
                .with_storage_creator(self.store.clone(), self.objects.clone())
                .build()
        }

        fn read_chain(&self, owner: &str) -> Processor {
            ProcessorBuilder::new()
                .with_storage_retriever(self.store.clone(), self.objects.clone(), owner)
                .with_decryption(self.cipher.clone())
                .build()
        }
    }

    #[tokio::test]
    async fn test_login_write_read_mirror() {
        let fx = Fixture::new();

        let mut secret = Secret::Login(
            Login::new(SecretMetadata::new("login0").with_owner("mark"))
                .with_credentials("leo", b"secret".to_vec()),
        );
        fx.write_chain().process(&mut secret).await.unwrap();

        // Plaintext never reaches the store.
        let mut raw = Login::new(SecretMetadata::new("login0"));
        fx.store.load_login(&mut raw, "mark").unwrap();
        assert_ne!(raw.password, b"secret");
        assert!(!raw.meta.encrypted_data_key.is_empty());

        let mut read = Secret::empty(SecretKind::Login, "login0");
        fx.read_chain("mark").process(&mut read).await.unwrap();
        match read {
            Secret::Login(login) => {
                assert_eq!(login.login, "leo");
                assert_eq!(login.password, b"secret");
            }
            other => panic!("expected login, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_card_fields_share_one_data_key() {
        let fx = Fixture::new();

        let mut secret = Secret::Card(
            Card::new(SecretMetadata::new("card0").with_owner("mark"))
                .with_holder("Leo Tolstoy")
                .with_number(b"4111111111111111".to_vec())
                .with_expiry(12, 2030)
                .with_cvc(b"123".to_vec()),
        );
        fx.write_chain().process(&mut secret).await.unwrap();

        let mut raw = Card::new(SecretMetadata::new("card0"));
        fx.store.load_card(&mut raw, "mark").unwrap();
        let key = raw.meta.encrypted_data_key.clone();

        // Both ciphertext fields decrypt under the single stored key.
        assert_eq!(
            fx.cipher.decrypt(&raw.number, &key).unwrap(),
            b"4111111111111111"
        );
        assert_eq!(fx.cipher.decrypt(&raw.cvc, &key).unwrap(), b"123");

        let mut read = Secret::empty(SecretKind::Card, "card0");
        fx.read_chain("mark").process(&mut read).await.unwrap();
        match read {
            Secret::Card(card) => {
                assert_eq!(card.number, b"4111111111111111");
                assert_eq!(card.cvc, b"123");
                assert_eq!(card.expiry_month, 12);
            }
            other => panic!("expected card, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_validation_failure_inserts_nothing() {
        let fx = Fixture::new();

        let mut secret = Secret::Login(
            Login::new(SecretMetadata::new("bad").with_owner("mark"))
                .with_credentials("ab", b"short".to_vec()),
        );
        let err = fx.write_chain().process(&mut secret).await.unwrap_err();
        assert!(err.to_string().contains("validation failed"));

        assert!(fx
            .store
            .list_paths(SecretKind::Login, "mark")
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_note_round_trip_and_list_delete() {
        let fx = Fixture::new();

        let mut secret = Secret::Note(
            Note::new(SecretMetadata::new("note0").with_owner("mark")).with_text(b"remember".to_vec()),
        );
        fx.write_chain().process(&mut secret).await.unwrap();

        let mut list_chain = ProcessorBuilder::new()
            .with_storage_lister(fx.store.clone(), "mark")
            .build();
        let mut receiver = Secret::empty(SecretKind::Note, "");
        list_chain.process(&mut receiver).await.unwrap();
        assert_eq!(list_chain.take_listing().unwrap(), vec!["note0".to_string()]);

        let mut delete_chain = ProcessorBuilder::new()
            .with_storage_deleter(fx.store.clone(), fx.objects.clone(), "mark")
            .build();
        let mut target = Secret::empty(SecretKind::Note, "note0");
        delete_chain.process(&mut target).await.unwrap();

        let mut list_chain = ProcessorBuilder::new()
            .with_storage_lister(fx.store.clone(), "mark")
            .build();
        let mut receiver = Secret::empty(SecretKind::Note, "");
        list_chain.process(&mut receiver).await.unwrap();
        assert!(list_chain.take_listing().unwrap().is_empty());
    }
}
