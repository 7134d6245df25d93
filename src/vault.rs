use std::sync::Arc;
use anyhow::Result;
use tracing::info;

use crate::config::VaultConfig;
use crate::photos::PhotoStore;
use crate::spots::{SpotStore, SPOTS_KEY};
use crate::storage::{BackendKind, KvStore, LocalKv};

/// Everything a command needs, wired once from the configuration.
pub struct Vault {
    pub config: VaultConfig,
    pub kv: Arc<dyn KvStore>,
    pub backend: BackendKind,
    pub spots: SpotStore,
}

impl Vault {
    pub fn open(config: VaultConfig) -> Result<Self> {
        config.ensure_directories()?;

        let kv: Arc<dyn KvStore> = Arc::new(LocalKv::new(
            config.data_directory.clone(),
            config.max_entry_size,
        ));
        Self::with_store(config, kv)
    }

    pub fn with_store(config: VaultConfig, kv: Arc<dyn KvStore>) -> Result<Self> {
        let backend = config.backend.resolve(kv.as_ref())?;
        let photos = Arc::new(PhotoStore::open(backend, Arc::clone(&kv))?.reserve(SPOTS_KEY));
        let spots = SpotStore::new(Arc::clone(&kv), photos);

        info!(
            backend = %backend,
            data = ?config.data_directory,
            max_entry_size = ?kv.max_entry_size(),
            "vault opened"
        );

        Ok(Self {
            config,
            kv,
            backend,
            spots,
        })
    }

    pub fn photos(&self) -> &Arc<PhotoStore> {
        self.spots.photos()
    }
}
