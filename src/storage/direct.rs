use std::sync::Arc;
use async_trait::async_trait;
use tracing::info;

use crate::error::{BlobError, Result};
use crate::storage::{BackendKind, KvStore, ObjectStore, StoredObject};

/// Pass-through store for backends that hold large values natively.
///
/// The payload lives under the logical key itself and `read` hands the key
/// back as the object reference.
pub struct DirectStore {
    kv: Arc<dyn KvStore>,
}

impl DirectStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }
}

#[async_trait]
impl ObjectStore for DirectStore {
    fn backend(&self) -> BackendKind {
        BackendKind::Direct
    }

    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        self.kv
            .set(key, data)
            .await
            .map_err(|e| BlobError::write(key, e))?;
        info!(key, bytes = data.len(), "object stored");
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<StoredObject>> {
        let present = self
            .kv
            .contains(key)
            .await
            .map_err(|e| BlobError::read(key, e))?;
        Ok(present.then(|| StoredObject::Reference(key.to_string())))
    }

    async fn fetch(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.kv.get(key).await.map_err(|e| BlobError::read(key, e))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.kv
            .delete(key)
            .await
            .map_err(|e| BlobError::write(key, e))
    }
}
