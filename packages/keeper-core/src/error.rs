//! # Error Handling
//!
//! One error type for the whole project, categorized by domain. The server
//! maps categories to HTTP status codes through [`Error::kind`]; the client
//! maps any error to a non-zero exit code.

use thiserror::Error;

/// Result type alias for Keeper operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Keeper
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Authentication
    // ========================================================================
    /// No user registered under this login
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Password verification failed
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Registration attempted with a login that is already taken
    #[error("user with login {0} already exists")]
    UserExists(String),

    /// Token failed parsing, signature, or claim checks
    #[error("invalid token: {0}")]
    InvalidToken(String),

    /// Token is past its expiry
    #[error("token expired")]
    TokenExpired,

    /// Missing or malformed `authorization` header
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    // ========================================================================
    // Validation
    // ========================================================================
    /// One or more input rules were violated; the message joins all of them
    #[error("validation failed: {0}")]
    Validation(String),

    /// Operation does not support this secret type
    #[error("{0} data type is not allowed here")]
    UnsupportedKind(String),

    // ========================================================================
    // Crypto
    // ========================================================================
    /// Wrapped data key failed authentication or was too short
    #[error("cannot unwrap data key")]
    KmsUnwrap,

    /// Master key file could not be read or unwrapped
    #[error("master key error: {0}")]
    MasterKey(String),

    /// Encryption operation failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption operation failed
    #[error("decryption failed: {0}")]
    Decryption(String),

    // ========================================================================
    // Storage
    // ========================================================================
    /// No secret at the requested path
    #[error("secret not found: {0}")]
    SecretNotFound(String),

    /// A secret of this type already exists at the path
    #[error("secret with path={0} already exists")]
    SecretExists(String),

    /// Relational store failure
    #[error("database error: {0}")]
    Database(String),

    /// Object store failure
    #[error("object store error: {0}")]
    ObjectStore(String),

    // ========================================================================
    // Transfer
    // ========================================================================
    /// A received chunk did not match its advertised digest
    #[error("aborted upload due to chunk hash mismatch at chunk {chunk_id}")]
    ChunkHashMismatch {
        /// Index of the offending chunk
        chunk_id: i64,
    },

    /// The reassembled file did not match the whole-file digest
    #[error("aborted due to file hash mismatch")]
    FileHashMismatch,

    /// Malformed or out-of-order protocol frame
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The peer went away or the operation was cancelled mid-flight
    #[error("canceled: {0}")]
    Canceled(String),

    // ========================================================================
    // Internal
    // ========================================================================
    /// I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for failures that should not happen in normal operation
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse error category, used by the server to pick a wire status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing/invalid token or credentials
    Unauthenticated,
    /// Input rejected before any side effects
    InvalidArgument,
    /// Uniqueness violated (duplicate user or path)
    AlreadyExists,
    /// Requested entity does not exist
    NotFound,
    /// Stream aborted mid-transfer (hash mismatch)
    Aborted,
    /// Deadline or client cancellation
    Canceled,
    /// Everything else
    Internal,
}

impl Error {
    /// Classify this error for status mapping.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UserNotFound(_)
            | Error::InvalidCredentials
            | Error::InvalidToken(_)
            | Error::TokenExpired
            | Error::Unauthenticated(_) => ErrorKind::Unauthenticated,

            Error::Validation(_) | Error::UnsupportedKind(_) | Error::Protocol(_) => {
                ErrorKind::InvalidArgument
            }

            Error::UserExists(_) | Error::SecretExists(_) => ErrorKind::AlreadyExists,

            Error::SecretNotFound(_) => ErrorKind::NotFound,

            Error::ChunkHashMismatch { .. } | Error::FileHashMismatch => ErrorKind::Aborted,

            Error::Canceled(_) => ErrorKind::Canceled,

            Error::KmsUnwrap
            | Error::MasterKey(_)
            | Error::Encryption(_)
            | Error::Decryption(_)
            | Error::Database(_)
            | Error::ObjectStore(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Internal(_) => ErrorKind::Internal,
        }
    }
}
