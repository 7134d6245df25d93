pub mod cli;
pub mod codec;
pub mod config;
pub mod coordination;
pub mod error;
pub mod photos;
pub mod spots;
pub mod startup;
pub mod storage;
pub mod utils;
pub mod vault;

pub use error::BlobError;
pub use photos::PhotoStore;
pub use spots::{Spot, SpotStore};
pub use storage::{BackendKind, ChunkedStore, DirectStore, KvStore, ObjectStore, StoredObject};
pub use vault::Vault;
