//! Food-spot journal records.
//!
//! All records live as one JSON array under [`SPOTS_KEY`]; photos are kept
//! out of line in the [`PhotoStore`] and referenced by key.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::coordination::KeyLocks;
use crate::photos::PhotoStore;
use crate::storage::KvStore;

pub const SPOTS_KEY: &str = "spots";
pub const PHOTO_KEY_PREFIX: &str = "spot_photo_";
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spot {
    pub id: String,
    pub spot_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub photo_key: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub rating: u8,
    #[serde(default)]
    pub favorite_menu_item: String,
}

/// Milliseconds since the epoch, strictly increasing within the process.
fn unique_millis() -> u64 {
    static LAST: AtomicU64 = AtomicU64::new(0);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let prev = LAST
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(now);
    now.max(prev + 1)
}

pub fn new_photo_key() -> String {
    format!("{}{}", PHOTO_KEY_PREFIX, unique_millis())
}

pub struct SpotStore {
    kv: Arc<dyn KvStore>,
    photos: Arc<PhotoStore>,
    locks: KeyLocks,
}

impl SpotStore {
    pub fn new(kv: Arc<dyn KvStore>, photos: Arc<PhotoStore>) -> Self {
        Self {
            kv,
            photos,
            locks: KeyLocks::new(),
        }
    }

    pub fn photos(&self) -> &Arc<PhotoStore> {
        &self.photos
    }

    pub async fn list(&self) -> Result<Vec<Spot>> {
        let Some(raw) = self.kv.get(SPOTS_KEY).await? else {
            return Ok(Vec::new());
        };

        let mut spots: Vec<Spot> =
            serde_json::from_slice(&raw).context("spot list is not valid JSON")?;
        // older records use "" for "no photo"
        for spot in &mut spots {
            spot.photo_key = spot.photo_key.take().filter(|k| !k.is_empty());
        }
        Ok(spots)
    }

    async fn store_all(&self, spots: &[Spot]) -> Result<()> {
        let json = serde_json::to_vec(spots)?;
        self.kv.set(SPOTS_KEY, &json).await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Spot>> {
        Ok(self.list().await?.into_iter().find(|s| s.id == id))
    }

    /// Create (empty id) or update a spot, storing `photo` first if given.
    ///
    /// The record list is only touched once the photo write succeeded; on a
    /// photo failure the error is returned and nothing is saved.
    pub async fn save(&self, mut spot: Spot, photo: Option<&[u8]>) -> Result<Spot> {
        if spot.rating > MAX_RATING {
            anyhow::bail!("rating {} is out of range 0..={}", spot.rating, MAX_RATING);
        }

        let _guard = self.locks.lock(SPOTS_KEY).await;
        let mut spots = self.list().await?;

        let existing = if spot.id.is_empty() {
            None
        } else {
            let index = spots
                .iter()
                .position(|s| s.id == spot.id)
                .with_context(|| format!("spot '{}' not found", spot.id))?;
            Some(index)
        };
        let previous_photo = existing.and_then(|i| spots[i].photo_key.clone());

        if let Some(source) = photo {
            let key = new_photo_key();
            self.photos
                .save(&key, source)
                .await
                .with_context(|| format!("failed to store photo for '{}'", spot.spot_name))?;
            spot.photo_key = Some(key);
        }

        match existing {
            Some(index) => spots[index] = spot.clone(),
            None => {
                spot.id = unique_millis().to_string();
                spots.push(spot.clone());
            }
        }
        self.store_all(&spots).await?;
        info!(id = %spot.id, name = %spot.spot_name, "spot saved");

        if let Some(old) = previous_photo {
            if spot.photo_key.as_deref() != Some(old.as_str()) {
                if let Err(e) = self.photos.remove(&old).await {
                    warn!(key = %old, "failed to remove replaced photo: {}", e);
                }
            }
        }

        Ok(spot)
    }

    /// Remove a spot and its photo. Returns `false` if the id is unknown.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.locks.lock(SPOTS_KEY).await;
        let mut spots = self.list().await?;

        let Some(index) = spots.iter().position(|s| s.id == id) else {
            return Ok(false);
        };
        let removed = spots.remove(index);
        self.store_all(&spots).await?;
        info!(id, "spot deleted");

        if let Some(key) = removed.photo_key {
            if let Err(e) = self.photos.remove(&key).await {
                warn!(key = %key, "failed to remove photo of deleted spot: {}", e);
            }
        }
        Ok(true)
    }

    pub async fn photo_uri(&self, spot: &Spot) -> Result<Option<String>> {
        match &spot.photo_key {
            Some(key) => Ok(self.photos.uri(key).await?),
            None => Ok(None),
        }
    }
}
