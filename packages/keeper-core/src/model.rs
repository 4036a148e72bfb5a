//! # Secret Model
//!
//! Tagged variants over the four secret types, sharing a common metadata
//! header, plus the visitor seam the server's processing pipeline dispatches
//! through. Encrypted fields are byte buffers: the same field holds plaintext
//! on the way into the encryptor and ciphertext everywhere after it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Discriminator for the four secret types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretKind {
    Login,
    Card,
    Note,
    Binary,
}

impl SecretKind {
    /// Lower-case name, used in routes and log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretKind::Login => "login",
            SecretKind::Card => "card",
            SecretKind::Note => "note",
            SecretKind::Binary => "binary",
        }
    }
}

impl std::fmt::Display for SecretKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common header carried by every secret.
///
/// `encrypted_data_key` is the wrapped AES key protecting this secret's
/// payload fields; it is populated by the encryptor stage and is never empty
/// for a stored secret.
#[derive(Debug, Clone, Default)]
pub struct SecretMetadata {
    /// Surrogate id assigned by the metadata store
    pub secret_id: i64,
    /// User-supplied logical name, unique within a secret type
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub created_by: String,
    pub modified_by: String,
    /// User-defined key/value annotations, may be empty
    pub custom_meta: HashMap<String, String>,
    /// Wrapped DEK (opaque to everything but the KMS)
    pub encrypted_data_key: Vec<u8>,
}

impl SecretMetadata {
    /// New header at `path` with both timestamps set to now and everything
    /// else defaulted. Chain `with_*` calls for the optional fields, the same
    /// way retrieval queries build partially-populated receivers.
    pub fn new(path: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            secret_id: 0,
            path: path.into(),
            created_at: now,
            modified_at: now,
            created_by: String::new(),
            modified_by: String::new(),
            custom_meta: HashMap::new(),
            encrypted_data_key: Vec::new(),
        }
    }

    /// Stamp the creating (and, initially, modifying) user.
    pub fn with_owner(mut self, username: impl Into<String>) -> Self {
        let username = username.into();
        self.created_by = username.clone();
        self.modified_by = username;
        self
    }

    pub fn with_custom_meta(mut self, meta: HashMap<String, String>) -> Self {
        self.custom_meta = meta;
        self
    }

    pub fn with_data_key(mut self, wrapped: Vec<u8>) -> Self {
        self.encrypted_data_key = wrapped;
        self
    }
}

/// Login/password pair. `password` is encrypted at rest.
#[derive(Debug, Clone, Default)]
pub struct Login {
    pub login_id: i64,
    pub login: String,
    pub password: Vec<u8>,
    pub meta: SecretMetadata,
}

impl Login {
    pub fn new(meta: SecretMetadata) -> Self {
        Self {
            meta,
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, login: impl Into<String>, password: impl Into<Vec<u8>>) -> Self {
        self.login = login.into();
        self.password = password.into();
        self
    }
}

/// Payment card. `number` and `cvc` are encrypted at rest, under the same
/// data key.
#[derive(Debug, Clone, Default)]
pub struct Card {
    pub card_id: i64,
    pub cardholder_name: String,
    pub number: Vec<u8>,
    pub expiry_month: u8,
    pub expiry_year: u16,
    pub cvc: Vec<u8>,
    pub meta: SecretMetadata,
}

impl Card {
    pub fn new(meta: SecretMetadata) -> Self {
        Self {
            meta,
            ..Self::default()
        }
    }

    pub fn with_holder(mut self, name: impl Into<String>) -> Self {
        self.cardholder_name = name.into();
        self
    }

    pub fn with_number(mut self, number: impl Into<Vec<u8>>) -> Self {
        self.number = number.into();
        self
    }

    pub fn with_expiry(mut self, month: u8, year: u16) -> Self {
        self.expiry_month = month;
        self.expiry_year = year;
        self
    }

    pub fn with_cvc(mut self, cvc: impl Into<Vec<u8>>) -> Self {
        self.cvc = cvc.into();
        self
    }
}

/// Free-form note. `text` is encrypted at rest.
#[derive(Debug, Clone, Default)]
pub struct Note {
    pub note_id: i64,
    pub text: Vec<u8>,
    pub meta: SecretMetadata,
}

impl Note {
    pub fn new(meta: SecretMetadata) -> Self {
        Self {
            meta,
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<Vec<u8>>) -> Self {
        self.text = text.into();
        self
    }
}

/// One chunk of an uploaded binary, or its terminal metadata record.
///
/// Data chunks carry `Some(bytes)` and live in object storage only. The
/// terminal record carries `data: None` together with the total chunk count
/// and the whole-file digest; it is the only row the metadata store keeps.
/// The chunk-0 record's `encrypted_data_key` is authoritative for every
/// subsequent chunk of the same path.
#[derive(Debug, Clone, Default)]
pub struct Binary {
    pub binary_id: i64,
    /// Zero-based chunk index; on the terminal record, the total chunk count
    pub chunk_id: i64,
    /// Total chunk count (populated on the terminal record and on retrieval)
    pub chunks: i64,
    /// Hex SHA-256 of the whole file (terminal record only)
    pub hash: String,
    /// Chunk payload; `None` marks the terminal record
    pub data: Option<Vec<u8>>,
    pub meta: SecretMetadata,
}

impl Binary {
    pub fn new(meta: SecretMetadata) -> Self {
        Self {
            meta,
            ..Self::default()
        }
    }

    pub fn with_chunk(mut self, chunk_id: i64, data: Vec<u8>) -> Self {
        self.chunk_id = chunk_id;
        self.data = Some(data);
        self
    }

    pub fn with_chunk_id(mut self, chunk_id: i64) -> Self {
        self.chunk_id = chunk_id;
        self
    }

    pub fn with_summary(mut self, chunks: i64, hash: impl Into<String>) -> Self {
        self.chunks = chunks;
        self.hash = hash.into();
        self
    }

    /// Whether this is the terminal metadata record rather than a data chunk.
    pub fn is_terminal(&self) -> bool {
        self.data.is_none()
    }
}

/// Visitor over the secret variants.
///
/// Pipeline stages implement this once per variant instead of open-coding the
/// union at every step. Methods are async because storage stages touch the
/// database and the object store.
#[async_trait]
pub trait SecretVisitor: Send {
    async fn visit_login(&mut self, login: &mut Login) -> Result<()>;
    async fn visit_card(&mut self, card: &mut Card) -> Result<()>;
    async fn visit_note(&mut self, note: &mut Note) -> Result<()>;
    async fn visit_binary(&mut self, binary: &mut Binary) -> Result<()>;
}

/// Tagged union over the four secret types.
#[derive(Debug, Clone)]
pub enum Secret {
    Login(Login),
    Card(Card),
    Note(Note),
    Binary(Binary),
}

impl Secret {
    /// Double dispatch into the matching `visit_*` method.
    pub async fn accept<V>(&mut self, visitor: &mut V) -> Result<()>
    where
        V: SecretVisitor + ?Sized,
    {
        match self {
            Secret::Login(login) => visitor.visit_login(login).await,
            Secret::Card(card) => visitor.visit_card(card).await,
            Secret::Note(note) => visitor.visit_note(note).await,
            Secret::Binary(binary) => visitor.visit_binary(binary).await,
        }
    }

    pub fn kind(&self) -> SecretKind {
        match self {
            Secret::Login(_) => SecretKind::Login,
            Secret::Card(_) => SecretKind::Card,
            Secret::Note(_) => SecretKind::Note,
            Secret::Binary(_) => SecretKind::Binary,
        }
    }

    pub fn metadata(&self) -> &SecretMetadata {
        match self {
            Secret::Login(s) => &s.meta,
            Secret::Card(s) => &s.meta,
            Secret::Note(s) => &s.meta,
            Secret::Binary(s) => &s.meta,
        }
    }

    pub fn metadata_mut(&mut self) -> &mut SecretMetadata {
        match self {
            Secret::Login(s) => &mut s.meta,
            Secret::Card(s) => &mut s.meta,
            Secret::Note(s) => &mut s.meta,
            Secret::Binary(s) => &mut s.meta,
        }
    }

    pub fn path(&self) -> &str {
        &self.metadata().path
    }

    /// An empty receiver of the given kind at `path`, used by retrieval,
    /// list, and delete flows.
    pub fn empty(kind: SecretKind, path: impl Into<String>) -> Self {
        let meta = SecretMetadata::new(path);
        match kind {
            SecretKind::Login => Secret::Login(Login::new(meta)),
            SecretKind::Card => Secret::Card(Card::new(meta)),
            SecretKind::Note => Secret::Note(Note::new(meta)),
            SecretKind::Binary => Secret::Binary(Binary::new(meta)),
        }
    }
}
