//! Orphan-chunk reaper.
//!
//! Chunk objects are written before the terminal metadata row commits, so an
//! upload that aborts mid-stream (hash mismatch, dropped connection, failed
//! commit) leaves chunks in the object store with no owning `binaries` row.
//! This task periodically sweeps object-store prefixes and deletes the ones
//! no metadata row points at.
//!
//! A prefix is only collected once its newest object is older than a grace
//! window, so an upload that is still streaming is never mistaken for
//! garbage.

use std::time::Duration;

use chrono::Utc;

use keeper_core::error::Result;

use crate::state::AppState;

/// Minimum age of a prefix's newest object before it may be collected.
const ORPHAN_GRACE_SECS: i64 = 3600;

/// Spawn the periodic sweep. `interval_secs == 0` disables the reaper.
pub fn spawn(state: AppState, interval_secs: u64) {
    if interval_secs == 0 {
        tracing::info!("orphan-chunk reaper disabled");
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            match sweep(&state).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "orphan chunk prefixes collected"),
                Err(err) => tracing::warn!(error = %err, "orphan sweep failed"),
            }
        }
    });
}

/// One sweep across the bucket. Returns the number of prefixes removed.
pub(crate) async fn sweep(state: &AppState) -> Result<usize> {
    let mut removed = 0;

    for prefix in state.objects.list_prefixes().await? {
        let path = prefix.trim_end_matches('/');
        if state.metadata.binary_exists(path)? {
            continue;
        }

        let newest = state.objects.newest_modified(&prefix).await?;
        let stale = match newest {
            Some(modified) => (Utc::now() - modified).num_seconds() > ORPHAN_GRACE_SECS,
            // Prefix listed but no objects behind it anymore; nothing to do.
            None => false,
        };
        if !stale {
            continue;
        }

        tracing::info!(path, "deleting orphan chunks");
        state.objects.delete_prefix(&prefix).await?;
        removed += 1;
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::auth::AuthService;
    use crate::storage::object::memory::MemoryObjectStore;
    use crate::storage::object::ObjectStore;
    use crate::storage::MetadataStore;
    use keeper_core::crypto::{EnvelopeCipher, Kms};
    use keeper_core::model::{Binary, SecretMetadata};

    fn test_state() -> (AppState, Arc<MemoryObjectStore>) {
        let metadata = Arc::new(MetadataStore::open(":memory:").unwrap());
        let objects = Arc::new(MemoryObjectStore::new());
        let cipher = Arc::new(EnvelopeCipher::new(Arc::new(Kms::from_raw_key([4u8; 32]))));
        let auth = Arc::new(AuthService::new(metadata.clone(), b"a", b"r"));
        (
            AppState::new(metadata, objects.clone(), cipher, auth),
            objects,
        )
    }

    #[tokio::test]
    async fn test_sweep_removes_stale_orphans_only() {
        let (state, objects) = test_state();
        let old = Utc::now() - chrono::Duration::seconds(2 * ORPHAN_GRACE_SECS);

        // Orphan, stale → collected.
        objects.put_with_time("orphan.bin/0", vec![1], old);
        objects.put_with_time("orphan.bin/1", vec![2], old);

        // Orphan but fresh (upload in flight) → kept.
        objects.put("fresh.bin/0", vec![3]).await.unwrap();

        // Stale but owned by a metadata row → kept.
        objects.put_with_time("kept.bin/0", vec![4], old);
        let mut terminal = Binary::new(
            SecretMetadata::new("kept.bin")
                .with_owner("mark")
                .with_data_key(vec![9]),
        )
        .with_summary(1, "h");
        state.metadata.insert_binary(&mut terminal).unwrap();

        let removed = sweep(&state).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            objects.keys(),
            vec!["fresh.bin/0".to_string(), "kept.bin/0".to_string()]
        );
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent() {
        let (state, objects) = test_state();
        let old = Utc::now() - chrono::Duration::seconds(2 * ORPHAN_GRACE_SECS);
        objects.put_with_time("orphan.bin/0", vec![1], old);

        assert_eq!(sweep(&state).await.unwrap(), 1);
        assert_eq!(sweep(&state).await.unwrap(), 0);
    }
}
