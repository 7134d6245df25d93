use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use anyhow::Result;

use crate::error::BlobError;
use crate::storage::{BackendKind, KvStore};
use crate::utils::limits::DEFAULT_MAX_ENTRY_SIZE;

pub const DEFAULT_CONFIG_FILE: &str = "spotvault.toml";

/// Backend selection as written in the config file or on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendSetting {
    /// Chunked if the store has an entry ceiling, direct otherwise
    Auto,
    Chunked,
    Direct,
}

impl BackendSetting {
    /// Resolved once at startup against the opened store.
    ///
    /// Direct storage over a store with an entry ceiling is rejected, since
    /// any photo above the ceiling would fail to write.
    pub fn resolve(self, kv: &dyn KvStore) -> Result<BackendKind, BlobError> {
        let limit = kv.max_entry_size();
        match (self, limit) {
            (BackendSetting::Chunked, _) => Ok(BackendKind::Chunked),
            (BackendSetting::Direct, Some(limit)) => Err(BlobError::Config(format!(
                "direct backend needs a store without an entry limit, this one caps entries at {} bytes",
                limit
            ))),
            (BackendSetting::Direct, None) => Ok(BackendKind::Direct),
            (BackendSetting::Auto, Some(_)) => Ok(BackendKind::Chunked),
            (BackendSetting::Auto, None) => Ok(BackendKind::Direct),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub data_directory: PathBuf,
    pub backend: BackendSetting,
    /// Per-entry ceiling of the local store; absent means unlimited
    #[serde(default)]
    pub max_entry_size: Option<usize>,
    pub auto_create_directories: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from("./data"),
            backend: BackendSetting::Auto,
            max_entry_size: Some(DEFAULT_MAX_ENTRY_SIZE),
            auto_create_directories: true,
        }
    }
}

impl VaultConfig {
    pub fn load_or_create(config_path: Option<&str>) -> Result<Self> {
        let config_file = config_path.unwrap_or(DEFAULT_CONFIG_FILE);

        if std::path::Path::new(config_file).exists() {
            let content = std::fs::read_to_string(config_file)?;
            let config: VaultConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save(config_file)?;
            Ok(config)
        }
    }

    pub fn save(&self, config_path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        if self.auto_create_directories && !self.data_directory.exists() {
            std::fs::create_dir_all(&self.data_directory)?;
            tracing::info!("Created data directory: {:?}", self.data_directory);
        }
        Ok(())
    }
}
