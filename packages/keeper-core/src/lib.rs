//! # Keeper Core
//!
//! Shared library for the Keeper secret manager: the secret data model,
//! envelope encryption, chunk hashing, and the wire protocol spoken between
//! the `keeperd` server and the `keeper` client.
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire project
//! - [`model`] - Secret variants, shared metadata, visitor dispatch
//! - [`crypto`] - KMS (master/data keys) and the envelope cipher
//! - [`chunk`] - Binary chunking constants and integrity digests
//! - [`wire`] - Request/response bodies and WebSocket transfer frames
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       ENVELOPE ENCRYPTION LAYERS                        │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  RSA private key (PEM, on disk)                                        │
//! │        │ OAEP-SHA256 unwrap, once at startup                           │
//! │        ▼                                                                │
//! │  Master key / KEK (32 bytes, process memory only)                      │
//! │        │ AES-256-GCM wrap/unwrap                                       │
//! │        ▼                                                                │
//! │  Data key / DEK (32 bytes, one per secret, stored wrapped)             │
//! │        │ AES-256-GCM, 12-byte nonce ── nonce‖ciphertext‖tag            │
//! │        ▼                                                                │
//! │  Secret payload (password, card number, note text, binary chunk)       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A compromised DEK exposes exactly one secret; the KEK never leaves the
//! process unwrapped, and is itself only stored wrapped by the RSA key.

pub mod chunk;
pub mod crypto;
pub mod error;
pub mod model;
pub mod wire;

pub use error::{Error, ErrorKind, Result};
pub use model::{Binary, Card, Login, Note, Secret, SecretKind, SecretMetadata, SecretVisitor};
