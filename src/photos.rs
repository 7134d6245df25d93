use std::sync::Arc;
use tracing::debug;

use crate::codec::{BlobCodec, Identity, ReencodeCodec};
use crate::error::{BlobError, Result};
use crate::storage::{BackendKind, ChunkedStore, DirectStore, KvStore, ObjectStore, StoredObject};

/// Codec and object store paired for one backend.
///
/// Built once at startup and handed to whatever stores photos, so backend
/// checks do not leak into record handling.
pub struct PhotoStore {
    codec: Arc<dyn BlobCodec>,
    objects: Arc<dyn ObjectStore>,
    reserved: Vec<String>,
}

impl PhotoStore {
    pub fn new(codec: Arc<dyn BlobCodec>, objects: Arc<dyn ObjectStore>) -> Self {
        Self {
            codec,
            objects,
            reserved: Vec::new(),
        }
    }

    /// Refuse to write or delete `key`; other data shares the namespace.
    pub fn reserve(mut self, key: &str) -> Self {
        self.reserved.push(key.to_string());
        self
    }

    fn check_key(&self, key: &str) -> Result<()> {
        if self.reserved.iter().any(|r| r == key) {
            return Err(BlobError::ReservedKey(key.to_string()));
        }
        Ok(())
    }

    pub fn open(kind: BackendKind, kv: Arc<dyn KvStore>) -> Result<Self> {
        let store = match kind {
            BackendKind::Chunked => Self::new(
                Arc::new(ReencodeCodec::new()),
                Arc::new(ChunkedStore::new(kv)?),
            ),
            BackendKind::Direct => Self::new(Arc::new(Identity), Arc::new(DirectStore::new(kv))),
        };
        debug!(backend = %kind, "photo store opened");
        Ok(store)
    }

    pub fn backend(&self) -> BackendKind {
        self.objects.backend()
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    /// Encode `source` for this backend and store it under `key`.
    pub async fn save(&self, key: &str, source: &[u8]) -> Result<()> {
        self.check_key(key)?;
        let encoded = self.codec.encode(source).await?;
        self.objects.write(key, &encoded).await
    }

    pub async fn load(&self, key: &str) -> Result<Option<StoredObject>> {
        self.objects.read(key).await
    }

    pub async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.objects.fetch(key).await
    }

    pub async fn uri(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load(key).await?.map(|obj| obj.to_uri()))
    }

    pub async fn remove(&self, key: &str) -> Result<()> {
        self.check_key(key)?;
        self.objects.delete(key).await
    }
}
