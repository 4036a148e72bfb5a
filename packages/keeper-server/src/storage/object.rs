//! # Object Store
//!
//! Binary chunk storage on an S3-compatible backend. Chunks are keyed
//! `<path>/<chunk_id>` inside a single bucket. No metadata lives here;
//! ordering is strictly by the integer key suffix and the authoritative
//! record is the relational store's terminal row.
//!
//! The trait seam exists so the pipeline and reaper are testable against an
//! in-memory map; the production implementation is [`S3ObjectStore`].

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};

use keeper_core::error::{Error, Result};

/// Chunk-level object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write one object at `key`.
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;

    /// Read the object at `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Remove every object under `prefix`.
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;

    /// Top-level prefixes currently present (`"<path>/"`), for the reaper.
    async fn list_prefixes(&self) -> Result<Vec<String>>;

    /// Most recent modification time of any object under `prefix`.
    async fn newest_modified(&self, prefix: &str) -> Result<Option<DateTime<Utc>>>;
}

/// Object key for chunk `chunk_id` of the binary at `path`.
pub fn chunk_key(path: &str, chunk_id: i64) -> String {
    format!("{path}/{chunk_id}")
}

/// Connection settings for the S3-compatible backend.
#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub bucket: String,
}

/// S3-compatible implementation (MinIO and friends work via path-style
/// addressing against `endpoint`).
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

fn s3_err<E>(err: E) -> Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    Error::ObjectStore(format!("{}", DisplayErrorContext(&err)))
}

impl S3ObjectStore {
    /// Build the client and make sure the bucket exists.
    pub async fn connect(settings: S3Settings) -> Result<Self> {
        let credentials = Credentials::new(
            settings.access_key.clone(),
            settings.secret_key.clone(),
            None,
            None,
            "keeper-static",
        );

        let config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .endpoint_url(&settings.endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = Client::from_conf(config);
        let store = Self {
            client,
            bucket: settings.bucket.clone(),
        };

        if store
            .client
            .head_bucket()
            .bucket(&store.bucket)
            .send()
            .await
            .is_err()
        {
            match store
                .client
                .create_bucket()
                .bucket(&store.bucket)
                .send()
                .await
            {
                Ok(_) => tracing::info!(bucket = %store.bucket, "created object-store bucket"),
                // Lost a race with another instance, or the backend reports
                // ownership differently; subsequent puts will surface real
                // connectivity problems.
                Err(e) => tracing::warn!(bucket = %store.bucket, error = %DisplayErrorContext(&e), "create bucket failed"),
            }
        }

        Ok(store)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(s3_err)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(s3_err)?;

        let bytes = object.body.collect().await.map_err(s3_err)?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let mut continuation: Option<String> = None;
        loop {
            let list = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(s3_err)?;

            for object in list.contents() {
                let Some(key) = object.key() else { continue };
                self.client
                    .delete_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(s3_err)?;
            }

            match list.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }
        Ok(())
    }

    async fn list_prefixes(&self) -> Result<Vec<String>> {
        let mut prefixes = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let list = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .delimiter("/")
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(s3_err)?;

            for common in list.common_prefixes() {
                if let Some(prefix) = common.prefix() {
                    prefixes.push(prefix.to_string());
                }
            }

            match list.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }
        Ok(prefixes)
    }

    async fn newest_modified(&self, prefix: &str) -> Result<Option<DateTime<Utc>>> {
        let mut newest: Option<DateTime<Utc>> = None;
        let mut continuation: Option<String> = None;
        loop {
            let list = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(s3_err)?;

            for object in list.contents() {
                let Some(modified) = object.last_modified() else {
                    continue;
                };
                let Some(modified) =
                    DateTime::from_timestamp(modified.secs(), modified.subsec_nanos())
                else {
                    continue;
                };
                if newest.map(|n| modified > n).unwrap_or(true) {
                    newest = Some(modified);
                }
            }

            match list.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }
        Ok(newest)
    }
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory object store used by pipeline, transfer, and reaper tests.

    use std::collections::BTreeMap;

    use parking_lot::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct MemoryObjectStore {
        objects: Mutex<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>,
    }

    impl MemoryObjectStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn keys(&self) -> Vec<String> {
            self.objects.lock().keys().cloned().collect()
        }

        /// Insert an object with a back-dated modification time.
        pub fn put_with_time(&self, key: &str, data: Vec<u8>, modified: DateTime<Utc>) {
            self.objects
                .lock()
                .insert(key.to_string(), (data, modified));
        }
    }

    #[async_trait]
    impl ObjectStore for MemoryObjectStore {
        async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
            self.objects
                .lock()
                .insert(key.to_string(), (data, Utc::now()));
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>> {
            self.objects
                .lock()
                .get(key)
                .map(|(data, _)| data.clone())
                .ok_or_else(|| Error::ObjectStore(format!("no such key: {key}")))
        }

        async fn delete_prefix(&self, prefix: &str) -> Result<()> {
            self.objects
                .lock()
                .retain(|key, _| !key.starts_with(prefix));
            Ok(())
        }

        async fn list_prefixes(&self) -> Result<Vec<String>> {
            let mut prefixes: Vec<String> = self
                .objects
                .lock()
                .keys()
                .filter_map(|key| key.split_once('/').map(|(p, _)| format!("{p}/")))
                .collect();
            prefixes.dedup();
            Ok(prefixes)
        }

        async fn newest_modified(&self, prefix: &str) -> Result<Option<DateTime<Utc>>> {
            Ok(self
                .objects
                .lock()
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(_, (_, modified))| *modified)
                .max())
        }
    }

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryObjectStore::new();
        store.put(&chunk_key("file.bin", 0), vec![1, 2]).await.unwrap();
        store.put(&chunk_key("file.bin", 1), vec![3]).await.unwrap();
        store.put(&chunk_key("other", 0), vec![4]).await.unwrap();

        assert_eq!(store.get("file.bin/0").await.unwrap(), vec![1, 2]);
        assert_eq!(
            store.list_prefixes().await.unwrap(),
            vec!["file.bin/".to_string(), "other/".to_string()]
        );

        store.delete_prefix("file.bin/").await.unwrap();
        assert_eq!(store.keys(), vec!["other/0".to_string()]);
        assert!(store.get("file.bin/0").await.is_err());
    }
}
