use std::fmt;
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Which object-store variant is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Payload split into bounded chunks behind a manifest entry
    Chunked,
    /// Backing store holds large values natively; the key is the reference
    Direct,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Chunked => write!(f, "chunked"),
            BackendKind::Direct => write!(f, "direct"),
        }
    }
}

/// A present object as returned by [`ObjectStore::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredObject {
    /// Reassembled payload bytes
    Inline(Vec<u8>),
    /// Opaque reference resolved by the backing store
    Reference(String),
}

impl StoredObject {
    /// Renderable reference: a data URL for inline bytes, the key otherwise.
    pub fn to_uri(&self) -> String {
        match self {
            StoredObject::Inline(data) => {
                let mime = image::guess_format(data)
                    .map(|format| format.to_mime_type())
                    .unwrap_or("application/octet-stream");
                format!(
                    "data:{};base64,{}",
                    mime,
                    base64::engine::general_purpose::STANDARD.encode(data)
                )
            }
            StoredObject::Reference(key) => key.clone(),
        }
    }
}

/// Key-addressed storage of arbitrary-length byte sequences.
///
/// A key is either absent or present; `write` fully replaces whatever was
/// stored under the key before.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn backend(&self) -> BackendKind;

    async fn write(
        &self,
        key: &str,
        data: &[u8],
    ) -> Result<()>;

    /// `Ok(None)` means no object exists under `key`.
    async fn read(
        &self,
        key: &str,
    ) -> Result<Option<StoredObject>>;

    /// Resolve the object to its bytes regardless of backend.
    async fn fetch(
        &self,
        key: &str,
    ) -> Result<Option<Vec<u8>>>;

    async fn delete(
        &self,
        key: &str,
    ) -> Result<()>;
}
