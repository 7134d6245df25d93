use async_trait::async_trait;

/// Size-limited key-value primitive the object stores are built on.
///
/// Every operation touches a single key and is atomic for that key.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(
        &self,
        key: &str,
    ) -> anyhow::Result<Option<Vec<u8>>>;

    async fn set(
        &self,
        key: &str,
        value: &[u8],
    ) -> anyhow::Result<()>;

    /// Removing a key that does not exist succeeds.
    async fn delete(
        &self,
        key: &str,
    ) -> anyhow::Result<()>;

    async fn contains(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn keys(&self) -> anyhow::Result<Vec<String>>;

    /// Per-entry ceiling in bytes; `None` when large values are stored natively.
    fn max_entry_size(&self) -> Option<usize>;
}

pub(crate) fn check_entry_size(
    key: &str,
    len: usize,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    match limit {
        Some(max) if len > max => anyhow::bail!(
            "entry '{}' is {} bytes, exceeds the {} byte limit",
            key,
            len,
            max
        ),
        _ => Ok(()),
    }
}
