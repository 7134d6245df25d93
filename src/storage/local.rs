use tokio::fs;
use std::path::PathBuf;
use async_trait::async_trait;
use tracing::debug;

use crate::storage::engine::{check_entry_size, KvStore};

/// File-backed key-value store: one file per key under `<root>/entries`.
///
/// File names are the hex encoding of the key, so arbitrary key strings map
/// to safe paths and can be listed back.
pub struct LocalKv {
    root: PathBuf,
    max_entry_size: Option<usize>,
}

impl LocalKv {
    pub fn new(root: PathBuf, max_entry_size: Option<usize>) -> Self {
        Self {
            root,
            max_entry_size,
        }
    }

    fn entries_dir(&self) -> PathBuf {
        self.root.join("entries")
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.entries_dir().join(hex::encode(key.as_bytes()))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.entries_dir()
            .join(format!("{}.tmp", hex::encode(key.as_bytes())))
    }
}

#[async_trait]
impl KvStore for LocalKv {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        match fs::read(self.entry_path(key)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        check_entry_size(key, value.len(), self.max_entry_size)?;
        fs::create_dir_all(self.entries_dir()).await?;

        // rename keeps the replace atomic for readers
        let tmp = self.temp_path(key);
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, self.entry_path(key)).await?;
        debug!(key, bytes = value.len(), "entry written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn contains(&self, key: &str) -> anyhow::Result<bool> {
        Ok(fs::try_exists(self.entry_path(key)).await?)
    }

    async fn keys(&self) -> anyhow::Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = match fs::read_dir(self.entries_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".tmp") {
                continue;
            }
            if let Ok(raw) = hex::decode(name.as_bytes()) {
                if let Ok(key) = String::from_utf8(raw) {
                    keys.push(key);
                }
            }
        }

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
    async fn test_local_kv() {
        let temp_dir = tempfile::tempdir().unwrap();
        let kv = LocalKv::new(temp_dir.path().to_path_buf(), None);

        assert!(kv.get("spot_photo_1_chunks").await.unwrap().is_none());
        assert!(kv.keys().await.unwrap().is_empty());

        kv.set("spot_photo_1_chunks", b"2").await.unwrap();
        kv.set("with/slash and space", b"x").await.unwrap();
        assert_eq!(kv.get("spot_photo_1_chunks").await.unwrap().unwrap(), b"2");
        assert!(kv.contains("with/slash and space").await.unwrap());

        let keys = kv.keys().await.unwrap();
        assert_eq!(keys, vec!["spot_photo_1_chunks", "with/slash and space"]);

        kv.delete("spot_photo_1_chunks").await.unwrap();
        kv.delete("spot_photo_1_chunks").await.unwrap();
        assert!(!kv.contains("spot_photo_1_chunks").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_kv_overwrite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let kv = LocalKv::new(temp_dir.path().to_path_buf(), None);

        kv.set("k", b"test data 1").await.unwrap();
        kv.set("k", b"test data 2").await.unwrap();

        assert_eq!(kv.get("k").await.unwrap().unwrap(), b"test data 2");
        assert_eq!(kv.keys().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_local_kv_ceiling() {
        let temp_dir = tempfile::tempdir().unwrap();
        let kv = LocalKv::new(temp_dir.path().to_path_buf(), Some(8));

        assert!(kv.set("k", &[0u8; 9]).await.is_err());
        assert!(kv.get("k").await.unwrap().is_none());
        kv.set("k", &[0u8; 8]).await.unwrap();
    }
}
