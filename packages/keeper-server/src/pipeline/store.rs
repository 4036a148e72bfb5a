//! Storage stages: create, retrieve, list, delete.
//!
//! Creation and deletion of a binary touch both stores. Chunk objects are
//! written before the terminal metadata row commits, so a failure in between
//! leaves orphan chunks for the reaper rather than a metadata row pointing at
//! missing data. Retrieval distinguishes its two binary modes by the wrapped
//! data key: an empty key means "load the terminal record", a populated one
//! means "fetch this chunk's bytes".

use std::sync::Arc;

use async_trait::async_trait;

use keeper_core::error::{Error, Result};
use keeper_core::model::{Binary, Card, Login, Note, SecretKind, SecretVisitor};

use super::Stage;
use crate::storage::{chunk_key, MetadataStore, ObjectStore};

/// Persists a secret: metadata plus typed row transactionally, chunk bytes
/// to the object store for binaries.
pub struct StorageCreator {
    store: Arc<MetadataStore>,
    objects: Arc<dyn ObjectStore>,
}

impl StorageCreator {
    pub fn new(store: Arc<MetadataStore>, objects: Arc<dyn ObjectStore>) -> Self {
        Self { store, objects }
    }
}

#[async_trait]
impl SecretVisitor for StorageCreator {
    async fn visit_login(&mut self, login: &mut Login) -> Result<()> {
        self.store.insert_login(login)?;
        tracing::info!(path = login.meta.path, "login created");
        Ok(())
    }

    async fn visit_card(&mut self, card: &mut Card) -> Result<()> {
        self.store.insert_card(card)?;
        tracing::info!(path = card.meta.path, "card created");
        Ok(())
    }

    async fn visit_note(&mut self, note: &mut Note) -> Result<()> {
        self.store.insert_note(note)?;
        tracing::info!(path = note.meta.path, "note created");
        Ok(())
    }

    async fn visit_binary(&mut self, binary: &mut Binary) -> Result<()> {
        match &binary.data {
            Some(data) => {
                let key = chunk_key(&binary.meta.path, binary.chunk_id);
                self.objects.put(&key, data.clone()).await?;
                tracing::debug!(key, size = data.len(), "chunk stored");
            }
            None => {
                self.store.insert_binary(binary)?;
                tracing::info!(
                    path = binary.meta.path,
                    chunks = binary.chunks,
                    "binary created"
                );
            }
        }
        Ok(())
    }
}

impl Stage for StorageCreator {
    fn name(&self) -> &'static str {
        "storage-creator"
    }
}

/// Loads a secret owned by `owner` into a partially-populated receiver.
pub struct StorageRetriever {
    store: Arc<MetadataStore>,
    objects: Arc<dyn ObjectStore>,
    owner: String,
}

impl StorageRetriever {
    pub fn new(store: Arc<MetadataStore>, objects: Arc<dyn ObjectStore>, owner: &str) -> Self {
        Self {
            store,
            objects,
            owner: owner.to_string(),
        }
    }
}

#[async_trait]
impl SecretVisitor for StorageRetriever {
    async fn visit_login(&mut self, login: &mut Login) -> Result<()> {
        self.store.load_login(login, &self.owner)
    }

    async fn visit_card(&mut self, card: &mut Card) -> Result<()> {
        self.store.load_card(card, &self.owner)
    }

    async fn visit_note(&mut self, note: &mut Note) -> Result<()> {
        self.store.load_note(note, &self.owner)
    }

    async fn visit_binary(&mut self, binary: &mut Binary) -> Result<()> {
        if binary.meta.encrypted_data_key.is_empty() {
            self.store.load_binary(binary, &self.owner)
        } else {
            let key = chunk_key(&binary.meta.path, binary.chunk_id);
            binary.data = Some(self.objects.get(&key).await?);
            Ok(())
        }
    }
}

impl Stage for StorageRetriever {
    fn name(&self) -> &'static str {
        "storage-retriever"
    }
}

/// Collects the paths of one secret type owned by `owner`.
pub struct StorageLister {
    store: Arc<MetadataStore>,
    owner: String,
    result: Option<Vec<String>>,
}

impl StorageLister {
    pub fn new(store: Arc<MetadataStore>, owner: &str) -> Self {
        Self {
            store,
            owner: owner.to_string(),
            result: None,
        }
    }

    fn list(&mut self, kind: SecretKind) -> Result<()> {
        self.result = Some(self.store.list_paths(kind, &self.owner)?);
        Ok(())
    }
}

#[async_trait]
impl SecretVisitor for StorageLister {
    async fn visit_login(&mut self, _login: &mut Login) -> Result<()> {
        self.list(SecretKind::Login)
    }

    async fn visit_card(&mut self, _card: &mut Card) -> Result<()> {
        self.list(SecretKind::Card)
    }

    async fn visit_note(&mut self, _note: &mut Note) -> Result<()> {
        self.list(SecretKind::Note)
    }

    async fn visit_binary(&mut self, _binary: &mut Binary) -> Result<()> {
        self.list(SecretKind::Binary)
    }
}

impl Stage for StorageLister {
    fn name(&self) -> &'static str {
        "storage-lister"
    }

    fn take_result(&mut self) -> Option<Vec<String>> {
        self.result.take()
    }
}

/// Removes a secret owned by `owner`; for binaries the whole object-store
/// prefix goes first, then the metadata row.
pub struct StorageDeleter {
    store: Arc<MetadataStore>,
    objects: Arc<dyn ObjectStore>,
    owner: String,
}

impl StorageDeleter {
    pub fn new(store: Arc<MetadataStore>, objects: Arc<dyn ObjectStore>, owner: &str) -> Self {
        Self {
            store,
            objects,
            owner: owner.to_string(),
        }
    }
}

#[async_trait]
impl SecretVisitor for StorageDeleter {
    async fn visit_login(&mut self, login: &mut Login) -> Result<()> {
        self.store
            .delete_secret(SecretKind::Login, &login.meta.path, &self.owner)?;
        tracing::info!(path = login.meta.path, "login deleted");
        Ok(())
    }

    async fn visit_card(&mut self, card: &mut Card) -> Result<()> {
        self.store
            .delete_secret(SecretKind::Card, &card.meta.path, &self.owner)?;
        tracing::info!(path = card.meta.path, "card deleted");
        Ok(())
    }

    async fn visit_note(&mut self, note: &mut Note) -> Result<()> {
        self.store
            .delete_secret(SecretKind::Note, &note.meta.path, &self.owner)?;
        tracing::info!(path = note.meta.path, "note deleted");
        Ok(())
    }

    async fn visit_binary(&mut self, binary: &mut Binary) -> Result<()> {
        // The metadata row is the authoritative record: confirm ownership
        // before touching chunk objects.
        let mut probe = Binary::new(keeper_core::model::SecretMetadata::new(&binary.meta.path));
        self.store.load_binary(&mut probe, &self.owner)?;

        self.objects
            .delete_prefix(&format!("{}/", binary.meta.path))
            .await?;
        self.store
            .delete_secret(SecretKind::Binary, &binary.meta.path, &self.owner)?;
        tracing::info!(path = binary.meta.path, "binary deleted");
        Ok(())
    }
}

impl Stage for StorageDeleter {
    fn name(&self) -> &'static str {
        "storage-deleter"
    }
}
