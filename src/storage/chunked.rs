//! Chunked object store.
//!
//! An object of `n` bytes is written as `ceil(n / CHUNK_SIZE)` chunk entries
//! followed by one manifest entry holding the count. The manifest is the
//! commit record: it is written only after every chunk landed, and a reader
//! never looks past the count it holds. A rewrite removes the old manifest
//! before touching any chunk, so a failed rewrite reads as absent.

use std::sync::Arc;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::coordination::KeyLocks;
use crate::error::{BlobError, Result};
use crate::storage::keys::{
    chunk_count, chunk_key, chunk_ranges, encode_manifest, manifest_key, parse_manifest,
};
use crate::storage::{BackendKind, KvStore, ObjectStore, StoredObject};
use crate::utils::limits::{CHUNK_READ_CONCURRENCY, CHUNK_SIZE};

/// Shape of a stored object as recorded by its manifest and chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectLayout {
    pub key: String,
    pub chunk_count: usize,
    pub chunk_lengths: Vec<usize>,
    pub total_len: usize,
}

pub struct ChunkedStore {
    kv: Arc<dyn KvStore>,
    locks: KeyLocks,
}

impl ChunkedStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Result<Self> {
        if let Some(limit) = kv.max_entry_size() {
            if limit < CHUNK_SIZE {
                return Err(BlobError::Config(format!(
                    "entry limit of {} bytes cannot hold a {} byte chunk",
                    limit, CHUNK_SIZE
                )));
            }
        }

        Ok(Self {
            kv,
            locks: KeyLocks::new(),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.kv
            .get(key)
            .await
            .map_err(|e| BlobError::read(key, e))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.kv
            .set(key, value)
            .await
            .map_err(|e| BlobError::write(key, e))
    }

    /// Committed chunk count, `None` if no manifest exists.
    async fn manifest(&self, key: &str) -> Result<Option<usize>> {
        let manifest = manifest_key(key);
        match self.get(&manifest).await? {
            None => Ok(None),
            Some(raw) => parse_manifest(&raw).map(Some).ok_or_else(|| {
                BlobError::corrupt(
                    key,
                    format!("unreadable manifest '{}'", String::from_utf8_lossy(&raw)),
                )
            }),
        }
    }

    async fn read_chunks(&self, key: &str, count: usize) -> Result<Vec<Vec<u8>>> {
        // bounded window; `buffered` yields in index order and stops at the first error
        stream::iter(0..count)
            .map(move |i| async move {
                let ck = chunk_key(key, i);
                let chunk = self.get(&ck).await?.ok_or_else(|| {
                    BlobError::corrupt(key, format!("chunk {} of {} is missing", i, count))
                })?;
                check_chunk_len(key, i, count, chunk.len())?;
                Ok::<_, BlobError>(chunk)
            })
            .buffered(CHUNK_READ_CONCURRENCY)
            .try_collect()
            .await
    }

    async fn has_manifest(&self, key: &str) -> Result<bool> {
        let manifest = manifest_key(key);
        self.kv
            .contains(&manifest)
            .await
            .map_err(|e| BlobError::read(&manifest, e))
    }

    async fn delete_manifest(&self, key: &str) -> Result<()> {
        let manifest = manifest_key(key);
        self.kv
            .delete(&manifest)
            .await
            .map_err(|e| BlobError::write(&manifest, e))
    }

    /// Delete chunk keys from `from` upward until the first absent index.
    ///
    /// Chunks are always written in index order, so leftovers of earlier
    /// objects under this key sit in one run past the live chunks. Best
    /// effort; nothing points at them.
    async fn sweep_chunks(&self, key: &str, from: usize) -> usize {
        let mut i = from;
        loop {
            let ck = chunk_key(key, i);
            match self.kv.contains(&ck).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!(key, chunk = i, "failed to probe stale chunk: {}", e);
                    break;
                }
            }
            if let Err(e) = self.kv.delete(&ck).await {
                warn!(key, chunk = i, "failed to remove stale chunk: {}", e);
                break;
            }
            i += 1;
        }
        i - from
    }

    /// Report manifest count and chunk lengths without reassembling.
    pub async fn inspect(&self, key: &str) -> Result<Option<ObjectLayout>> {
        let Some(count) = self.manifest(key).await? else {
            return Ok(None);
        };

        let chunks = self.read_chunks(key, count).await?;
        let chunk_lengths: Vec<usize> = chunks.iter().map(Vec::len).collect();

        Ok(Some(ObjectLayout {
            key: key.to_string(),
            chunk_count: count,
            total_len: chunk_lengths.iter().sum(),
            chunk_lengths,
        }))
    }
}

fn check_chunk_len(key: &str, index: usize, count: usize, len: usize) -> Result<()> {
    let last = index + 1 == count;
    let ok = if last {
        (1..=CHUNK_SIZE).contains(&len)
    } else {
        len == CHUNK_SIZE
    };

    if ok {
        Ok(())
    } else {
        Err(BlobError::corrupt(
            key,
            format!("chunk {} of {} has {} bytes", index, count, len),
        ))
    }
}

#[async_trait]
impl ObjectStore for ChunkedStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Chunked
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let _guard = self.locks.lock(key).await;

        if self.has_manifest(key).await? {
            // un-commit; old and new chunks must never sit behind one manifest
            self.delete_manifest(key).await?;
        }

        let count = chunk_count(data.len());
        debug!(key, bytes = data.len(), chunks = count, "writing chunks");

        for (i, range) in chunk_ranges(data.len()).enumerate() {
            self.set(&chunk_key(key, i), &data[range]).await?;
        }

        // commit
        self.set(&manifest_key(key), &encode_manifest(count)).await?;

        let stale = self.sweep_chunks(key, count).await;
        if stale > 0 {
            debug!(key, stale, "removed superseded chunks");
        }

        info!(key, bytes = data.len(), chunks = count, "object stored");
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<StoredObject>> {
        Ok(self.fetch(key).await?.map(StoredObject::Inline))
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let Some(count) = self.manifest(key).await? else {
            debug!(key, "no manifest");
            return Ok(None);
        };

        let chunks = self.read_chunks(key, count).await?;
        let mut data = Vec::with_capacity(chunks.iter().map(Vec::len).sum());
        for chunk in &chunks {
            data.extend_from_slice(chunk);
        }

        debug!(key, bytes = data.len(), chunks = count, "object reassembled");
        Ok(Some(data))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.locks.lock(key).await;

        let committed = self.has_manifest(key).await?;
        if committed {
            // un-commit first so a partial delete never looks like live data
            self.delete_manifest(key).await?;
        }
        let removed = self.sweep_chunks(key, 0).await;

        if committed || removed > 0 {
            info!(key, chunks = removed, "object deleted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use crate::storage::MemoryKv;

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    fn store() -> (Arc<MemoryKv>, ChunkedStore) {
        let kv = Arc::new(MemoryKv::with_limit(CHUNK_SIZE));
        let store = ChunkedStore::new(kv.clone()).unwrap();
        (kv, store)
    }

    /// Records every mutation and can fail the n-th `set`.
    #[derive(Default)]
    struct RecordingKv {
        inner: MemoryKv,
        log: Mutex<Vec<String>>,
        fail_on_set: Option<usize>,
    }

    #[async_trait]
    impl KvStore for RecordingKv {
        async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
            let n = {
                let mut log = self.log.lock().unwrap();
                log.push(format!("set {}", key));
                log.iter().filter(|l| l.starts_with("set ")).count()
            };
            if self.fail_on_set == Some(n) {
                anyhow::bail!("injected failure on {}", key);
            }
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> anyhow::Result<()> {
            self.log.lock().unwrap().push(format!("delete {}", key));
            self.inner.delete(key).await
        }

        async fn keys(&self) -> anyhow::Result<Vec<String>> {
            self.inner.keys().await
        }

        fn max_entry_size(&self) -> Option<usize> {
            None
        }
    }

    #[tokio::test]
    async fn test_round_trip_lengths() {
        let (_kv, store) = store();

        for (n, len) in [0, 1, CHUNK_SIZE - 1, CHUNK_SIZE, CHUNK_SIZE + 1, 5 * CHUNK_SIZE]
            .into_iter()
            .enumerate()
        {
            let key = format!("obj_{}", n);
            let data = pattern(len, n as u8);
            store.write(&key, &data).await.unwrap();
            assert_eq!(store.fetch(&key).await.unwrap().unwrap(), data, "len {}", len);
        }
    }

    #[tokio::test]
    async fn test_concrete_layout() {
        let (kv, store) = store();
        let data = pattern(2_500_000, 7);

        store.write("photo_1", &data).await.unwrap();

        assert_eq!(kv.get("photo_1_chunks").await.unwrap().unwrap(), b"3");
        let layout = store.inspect("photo_1").await.unwrap().unwrap();
        assert_eq!(layout.chunk_count, 3);
        assert_eq!(layout.chunk_lengths, vec![1_048_576, 1_048_576, 402_848]);
        assert_eq!(layout.total_len, 2_500_000);

        assert_eq!(
            store.read("photo_1").await.unwrap(),
            Some(StoredObject::Inline(data))
        );
    }

    #[tokio::test]
    async fn test_absent_is_not_empty() {
        let (_kv, store) = store();

        assert_eq!(store.read("nonexistent_key").await.unwrap(), None);
        assert!(store.inspect("nonexistent_key").await.unwrap().is_none());

        store.write("empty", &[]).await.unwrap();
        assert_eq!(
            store.read("empty").await.unwrap(),
            Some(StoredObject::Inline(Vec::new()))
        );
    }

    #[tokio::test]
    async fn test_empty_object_writes_no_chunks() {
        let (kv, store) = store();

        store.write("empty", &[]).await.unwrap();

        assert_eq!(kv.keys().await.unwrap(), vec!["empty_chunks"]);
        assert_eq!(kv.get("empty_chunks").await.unwrap().unwrap(), b"0");
    }

    #[tokio::test]
    async fn test_rewrite_same_object() {
        let (kv, store) = store();
        let data = pattern(CHUNK_SIZE + 10, 3);

        store.write("k", &data).await.unwrap();
        store.write("k", &data).await.unwrap();

        assert_eq!(store.fetch("k").await.unwrap().unwrap(), data);
        assert_eq!(kv.len().await, 3);
    }

    #[tokio::test]
    async fn test_shrink_then_read() {
        let (kv, store) = store();
        let long = pattern(3 * CHUNK_SIZE, 1);
        let short = pattern(CHUNK_SIZE, 2);

        store.write("k", &long).await.unwrap();
        store.write("k", &short).await.unwrap();

        assert_eq!(store.fetch("k").await.unwrap().unwrap(), short);
        assert!(!kv.contains("k_1").await.unwrap());
        assert!(!kv.contains("k_2").await.unwrap());
        assert_eq!(kv.keys().await.unwrap(), vec!["k_0", "k_chunks"]);
    }

    #[tokio::test]
    async fn test_grow_then_read() {
        let (_kv, store) = store();
        let short = pattern(10, 1);
        let long = pattern(2 * CHUNK_SIZE + 5, 2);

        store.write("k", &short).await.unwrap();
        store.write("k", &long).await.unwrap();

        assert_eq!(store.fetch("k").await.unwrap().unwrap(), long);
    }

    #[tokio::test]
    async fn test_missing_chunk_is_corrupt() {
        let (kv, store) = store();
        store.write("k", &pattern(3 * CHUNK_SIZE, 0)).await.unwrap();

        kv.delete("k_1").await.unwrap();

        let err = store.read("k").await.unwrap_err();
        assert!(matches!(err, BlobError::CorruptObject { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_short_chunk_is_corrupt() {
        let (kv, store) = store();
        store.write("k", &pattern(2 * CHUNK_SIZE, 0)).await.unwrap();

        kv.set("k_0", b"truncated").await.unwrap();

        assert!(store.fetch("k").await.unwrap_err().is_corrupt());
    }

    #[tokio::test]
    async fn test_bad_manifest_is_corrupt() {
        let (kv, store) = store();
        kv.set("k_chunks", b"three").await.unwrap();

        assert!(store.read("k").await.unwrap_err().is_corrupt());

        // a fresh write still recovers the key
        store.write("k", b"abc").await.unwrap();
        assert_eq!(store.fetch("k").await.unwrap().unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_manifest_written_last() {
        let kv = Arc::new(RecordingKv::default());
        let store = ChunkedStore::new(kv.clone()).unwrap();

        store.write("k", &pattern(2 * CHUNK_SIZE + 1, 0)).await.unwrap();

        let log = kv.log.lock().unwrap().clone();
        assert_eq!(log, vec!["set k_0", "set k_1", "set k_2", "set k_chunks"]);
    }

    #[tokio::test]
    async fn test_rewrite_uncommits_before_chunks() {
        let kv = Arc::new(RecordingKv::default());
        let store = ChunkedStore::new(kv.clone()).unwrap();

        store.write("k", &pattern(2 * CHUNK_SIZE, 0)).await.unwrap();
        kv.log.lock().unwrap().clear();
        store.write("k", &pattern(CHUNK_SIZE, 1)).await.unwrap();

        let log = kv.log.lock().unwrap().clone();
        assert_eq!(log, vec!["delete k_chunks", "set k_0", "set k_chunks", "delete k_1"]);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_manifest() {
        let kv = Arc::new(RecordingKv {
            fail_on_set: Some(2),
            ..Default::default()
        });
        let store = ChunkedStore::new(kv.clone()).unwrap();

        let err = store.write("k", &pattern(3 * CHUNK_SIZE, 0)).await.unwrap_err();
        match err {
            BlobError::StorageWrite { key, .. } => assert_eq!(key, "k_1"),
            other => panic!("unexpected error {:?}", other),
        }

        assert!(!kv.contains("k_chunks").await.unwrap());
        assert_eq!(store.read("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_rewrite_on_first_chunk_reads_as_absent() {
        let kv = Arc::new(RecordingKv {
            fail_on_set: Some(3),
            ..Default::default()
        });
        let store = ChunkedStore::new(kv.clone()).unwrap();

        store.write("k", &pattern(10, 1)).await.unwrap();
        // sets 1-2 were the first write; set 3 (k_0 of the rewrite) fails
        assert!(store.write("k", &pattern(20, 2)).await.is_err());

        assert_eq!(store.fetch("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_rewrite_never_mixes_chunks() {
        let kv = Arc::new(RecordingKv {
            fail_on_set: Some(5),
            ..Default::default()
        });
        let store = ChunkedStore::new(kv.clone()).unwrap();
        let old = vec![0x01; 2 * CHUNK_SIZE];
        let new = vec![0x02; 2 * CHUNK_SIZE];

        store.write("k", &old).await.unwrap();
        // sets 1-3 were the first write; the rewrite lands k_0 and fails on k_1
        let err = store.write("k", &new).await.unwrap_err();
        match err {
            BlobError::StorageWrite { key, .. } => assert_eq!(key, "k_1"),
            other => panic!("unexpected error {:?}", other),
        }

        assert_eq!(store.fetch("k").await.unwrap(), None);
        assert!(store.inspect("k").await.unwrap().is_none());

        // the key is usable again afterwards
        store.write("k", &new[..10]).await.unwrap();
        assert_eq!(store.fetch("k").await.unwrap().unwrap(), &new[..10]);
        assert_eq!(kv.inner.keys().await.unwrap(), vec!["k_0", "k_chunks"]);
    }

    #[tokio::test]
    async fn test_oversized_manifest_count_is_corrupt() {
        let (kv, store) = store();
        store.write("k", &pattern(CHUNK_SIZE + 1, 0)).await.unwrap();

        kv.set("k_chunks", b"50000000").await.unwrap();

        let err = store.read("k").await.unwrap_err();
        assert!(err.is_corrupt(), "{:?}", err);
        assert!(store.inspect("k").await.unwrap_err().is_corrupt());
    }

    /// Chunk `get`s complete in reverse index order.
    #[derive(Default)]
    struct ReversedKv {
        inner: MemoryKv,
        completed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl KvStore for ReversedKv {
        async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            let index = key.rsplit('_').next().and_then(|s| s.parse::<u64>().ok());
            if let Some(index) = index {
                tokio::time::sleep(Duration::from_millis(50u64.saturating_sub(10 * index))).await;
                self.completed.lock().unwrap().push(key.to_string());
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> anyhow::Result<()> {
            self.inner.delete(key).await
        }

        async fn keys(&self) -> anyhow::Result<Vec<String>> {
            self.inner.keys().await
        }

        fn max_entry_size(&self) -> Option<usize> {
            Some(CHUNK_SIZE)
        }
    }

    #[tokio::test]
    async fn test_reassembly_follows_index_not_arrival() {
        let kv = Arc::new(ReversedKv::default());
        let store = ChunkedStore::new(kv.clone()).unwrap();
        let data = pattern(3 * CHUNK_SIZE + 100, 9);

        store.write("k", &data).await.unwrap();
        kv.completed.lock().unwrap().clear();
        assert_eq!(store.fetch("k").await.unwrap().unwrap(), data);

        let completed = kv.completed.lock().unwrap().clone();
        assert_eq!(completed, vec!["k_3", "k_2", "k_1", "k_0"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let (kv, store) = store();
        store.write("k", &pattern(2 * CHUNK_SIZE, 0)).await.unwrap();
        store.write("other", b"keep").await.unwrap();

        store.delete("k").await.unwrap();

        assert_eq!(store.read("k").await.unwrap(), None);
        assert_eq!(kv.keys().await.unwrap(), vec!["other_0", "other_chunks"]);

        // deleting an absent key is a no-op
        store.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_unreadable_manifest_leaves_no_orphans() {
        let (kv, store) = store();
        store.write("a", &pattern(3 * CHUNK_SIZE, 0)).await.unwrap();
        store.write("b", &pattern(2 * CHUNK_SIZE, 0)).await.unwrap();
        kv.set("a_chunks", b"three").await.unwrap();
        kv.set("b_chunks", b"??").await.unwrap();

        store.delete("a").await.unwrap();
        store.write("b", b"short").await.unwrap();

        assert_eq!(kv.keys().await.unwrap(), vec!["b_0", "b_chunks"]);
        assert_eq!(store.fetch("b").await.unwrap().unwrap(), b"short");
    }

    #[tokio::test]
    async fn test_rejects_store_below_chunk_size() {
        let kv = Arc::new(MemoryKv::with_limit(CHUNK_SIZE - 1));
        assert!(matches!(
            ChunkedStore::new(kv),
            Err(BlobError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_writers_same_key() {
        let (_kv, store) = store();
        let store = Arc::new(store);
        let a = pattern(3 * CHUNK_SIZE, 1);
        let b = pattern(CHUNK_SIZE + 7, 2);

        let wa = {
            let store = Arc::clone(&store);
            let a = a.clone();
            tokio::spawn(async move { store.write("k", &a).await })
        };
        let wb = {
            let store = Arc::clone(&store);
            let b = b.clone();
            tokio::spawn(async move { store.write("k", &b).await })
        };
        wa.await.unwrap().unwrap();
        wb.await.unwrap().unwrap();

        let result = store.fetch("k").await.unwrap().unwrap();
        assert!(result == a || result == b);
    }
}
