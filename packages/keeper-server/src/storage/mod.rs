//! Persistence: the relational metadata store and the S3-compatible object
//! store. The metadata store owns the authoritative record of every secret;
//! the object store holds binary chunk payloads by reference
//! (`<path>/<chunk_id>`).

pub mod metadata;
pub mod object;
pub mod schema;

pub use metadata::MetadataStore;
pub use object::{chunk_key, ObjectStore, S3ObjectStore, S3Settings};
