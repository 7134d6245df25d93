use std::collections::HashMap;
use tokio::sync::RwLock;
use async_trait::async_trait;

use crate::storage::engine::{check_entry_size, KvStore};

/// In-process key-value store, optionally enforcing an entry ceiling.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    max_entry_size: Option<usize>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(max_entry_size: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entry_size: Some(max_entry_size),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        check_entry_size(key, value.len(), self.max_entry_size)?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn contains(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn keys(&self) -> anyhow::Result<Vec<String>> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn max_entry_size(&self) -> Option<usize> {
        self.max_entry_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_kv() {
        let kv = MemoryKv::new();

        kv.set("a", b"one").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().unwrap(), b"one");
        assert!(kv.contains("a").await.unwrap());

        kv.set("a", b"two").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().unwrap(), b"two");
        assert_eq!(kv.len().await, 1);

        kv.delete("a").await.unwrap();
        assert!(kv.get("a").await.unwrap().is_none());
        kv.delete("a").await.unwrap();
    }

    #[tokio::test]
    async fn test_entry_ceiling() {
        let kv = MemoryKv::with_limit(4);

        kv.set("small", b"1234").await.unwrap();
        assert!(kv.set("big", b"12345").await.is_err());
        assert!(!kv.contains("big").await.unwrap());
        assert_eq!(kv.max_entry_size(), Some(4));
    }
}
