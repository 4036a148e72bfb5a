//! # Binary Chunking
//!
//! Constants and integrity digests for the chunked upload/download protocol.
//!
//! A binary is sliced into fixed-size chunks; each chunk travels with the hex
//! SHA-256 of its payload, and the terminator frame carries the digest of the
//! whole file. Both sides keep a rolling [`FileDigest`] so the whole-file
//! hash is computed without buffering the file.

use sha2::{Digest, Sha256};

/// Chunk size for binary uploads: 512 KiB.
pub const CHUNK_SIZE: usize = 512 * 1024;

/// Hex SHA-256 of a chunk payload.
pub fn chunk_digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Verify a chunk against its advertised digest.
pub fn verify_chunk(data: &[u8], expected_hash: &str) -> bool {
    chunk_digest(data) == expected_hash
}

/// Rolling whole-file digest fed one chunk at a time, in order.
pub struct FileDigest {
    hasher: Sha256,
}

impl FileDigest {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    /// Fold a chunk into the file digest and return the chunk's own digest.
    pub fn add_chunk(&mut self, data: &[u8]) -> String {
        self.hasher.update(data);
        chunk_digest(data)
    }

    /// Hex digest of everything added so far. Non-consuming, so streaming
    /// loops can compare against the terminator and keep going on mismatch
    /// handling paths.
    pub fn finish(&self) -> String {
        hex::encode(self.hasher.clone().finalize())
    }
}

impl Default for FileDigest {
    fn default() -> Self {
        Self::new()
    }
}
