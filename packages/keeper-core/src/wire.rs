//! Wire protocol message definitions.
//!
//! The server speaks JSON: unary calls over HTTP bodies, streaming transfers
//! over WebSocket frames. All payload bytes inside [`TransferFrame::Chunk`]
//! are base64-encoded so frames stay valid JSON text.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::SecretKind;

// ── Authentication ────────────────────────────────────────────────────────────

/// Body of `POST /api/auth/login` and `POST /api/auth/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub login: String,
    pub password: String,
}

/// Body of `POST /api/auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Token pair handed out by register, login, and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: String,
}

// ── Secrets ───────────────────────────────────────────────────────────────────

/// Common header travelling with a typed payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub path: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginData {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardData {
    pub card_holder: String,
    pub number: String,
    pub expiry_month: u8,
    pub expiry_year: u16,
    pub cvv: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteData {
    pub text: String,
}

/// The typed payload variants carried by [`TypedData`].
///
/// Binary secrets never travel through the unary endpoints (the chunked
/// WebSocket transfer owns that flow), so there is no binary variant here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TypedPayload {
    Login { login: LoginData },
    Card { card: CardData },
    Note { note: NoteData },
}

impl TypedPayload {
    pub fn kind(&self) -> SecretKind {
        match self {
            TypedPayload::Login { .. } => SecretKind::Login,
            TypedPayload::Card { .. } => SecretKind::Card,
            TypedPayload::Note { .. } => SecretKind::Note,
        }
    }
}

/// Discriminated secret payload plus its metadata header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedData {
    pub base: Metadata,
    #[serde(flatten)]
    pub payload: TypedPayload,
}

/// Body of `POST /api/secrets`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    pub data: TypedData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetResponse {
    pub data: TypedData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse {
    pub secrets: Vec<String>,
}

/// Error body returned for any failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ── Chunk Transfer ────────────────────────────────────────────────────────────

/// Frames exchanged on the upload and download WebSockets.
///
/// Upload is client-streaming: the client sends `Chunk` frames in order,
/// closing with a terminator (`data` empty, `hash` = whole-file digest,
/// `chunk_id` = total chunk count); the server answers with one `Complete`
/// or `Error`. Download mirrors it server-side: `Chunk` frames then the
/// terminator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransferFrame {
    /// One slice of the file, or the terminator when `data` is empty.
    Chunk {
        filename: String,
        #[serde(with = "base64_bytes", default)]
        data: Vec<u8>,
        chunk_id: i64,
        hash: String,
    },

    /// Upload accepted and committed.
    Complete { message: String },

    /// Transfer aborted; the connection closes after this frame.
    Error { message: String },
}

impl TransferFrame {
    /// Build a data chunk frame.
    pub fn chunk(filename: impl Into<String>, data: Vec<u8>, chunk_id: i64, hash: String) -> Self {
        TransferFrame::Chunk {
            filename: filename.into(),
            data,
            chunk_id,
            hash,
        }
    }

    /// Build the terminator frame closing a stream of `chunks` chunks.
    pub fn terminator(filename: impl Into<String>, chunks: i64, file_hash: String) -> Self {
        TransferFrame::Chunk {
            filename: filename.into(),
            data: Vec::new(),
            chunk_id: chunks,
            hash: file_hash,
        }
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
