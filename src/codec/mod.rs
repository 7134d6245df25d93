pub mod reencode;

use async_trait::async_trait;

use crate::error::Result;

pub use reencode::{target_dimensions, ReencodeCodec};

/// Turns a source image into the payload handed to the object store.
#[async_trait]
pub trait BlobCodec: Send + Sync {
    async fn encode(&self, source: &[u8]) -> Result<Vec<u8>>;
}

/// Codec for backends that store large objects natively.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

#[async_trait]
impl BlobCodec for Identity {
    async fn encode(&self, source: &[u8]) -> Result<Vec<u8>> {
        Ok(source.to_vec())
    }
}
