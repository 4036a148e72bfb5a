//! Shared server state handed to every handler via axum's `State`.

use std::sync::Arc;

use keeper_core::crypto::EnvelopeCipher;

use crate::auth::AuthService;
use crate::storage::{MetadataStore, ObjectStore};

/// Cloneable bundle of the long-lived services.
///
/// Everything inside is read-only after initialization (the stores serialize
/// their own writes), so handlers share it freely across tasks.
#[derive(Clone)]
pub struct AppState {
    pub metadata: Arc<MetadataStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub cipher: Arc<EnvelopeCipher>,
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(
        metadata: Arc<MetadataStore>,
        objects: Arc<dyn ObjectStore>,
        cipher: Arc<EnvelopeCipher>,
        auth: Arc<AuthService>,
    ) -> Self {
        Self {
            metadata,
            objects,
            cipher,
            auth,
        }
    }
}
