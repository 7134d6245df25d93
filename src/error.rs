//! Errors surfaced by the blob layer (codec and object stores).

/// Failure kinds of the photo storage core.
///
/// None of these are retried internally. After a failed write the state of
/// the key is unknown and must be re-read before acting on it.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// The source could not be decoded as an image
    #[error("cannot decode image: {0}")]
    Decode(String),

    /// The re-encoded image could not be produced
    #[error("cannot encode image: {0}")]
    Encode(String),

    /// An underlying `set` or `delete` failed
    #[error("storage write failed for '{key}'")]
    StorageWrite {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// An underlying `get` failed
    #[error("storage read failed for '{key}'")]
    StorageRead {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Manifest present but the chunks do not match it
    #[error("object '{key}' is corrupt: {detail}")]
    CorruptObject { key: String, detail: String },

    /// The key belongs to another part of the store
    #[error("key '{0}' is reserved")]
    ReservedKey(String),

    /// Backend selection does not fit the backing store
    #[error("invalid storage configuration: {0}")]
    Config(String),
}

impl BlobError {
    pub(crate) fn write(key: &str, source: anyhow::Error) -> Self {
        BlobError::StorageWrite {
            key: key.to_string(),
            source,
        }
    }

    pub(crate) fn read(key: &str, source: anyhow::Error) -> Self {
        BlobError::StorageRead {
            key: key.to_string(),
            source,
        }
    }

    pub(crate) fn corrupt(key: &str, detail: impl Into<String>) -> Self {
        BlobError::CorruptObject {
            key: key.to_string(),
            detail: detail.into(),
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, BlobError::CorruptObject { .. })
    }
}

pub type Result<T> = std::result::Result<T, BlobError>;
