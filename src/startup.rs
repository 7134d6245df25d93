use serde::Serialize;
use tracing::{info, warn};
use anyhow::Result;

use crate::spots::SpotStore;

#[derive(Debug, Default, Serialize)]
pub struct VerifyReport {
    pub spots: usize,
    pub photos_checked: usize,
    pub photos_ok: usize,
    pub missing: Vec<String>,
    pub corrupt: Vec<String>,
}

impl VerifyReport {
    pub fn passed(&self) -> bool {
        self.missing.is_empty() && self.corrupt.is_empty()
    }
}

/// Checks that every spot's photo can still be loaded.
pub struct Verifier<'a> {
    spots: &'a SpotStore,
}

impl<'a> Verifier<'a> {
    pub fn new(spots: &'a SpotStore) -> Self {
        Self { spots }
    }

    pub async fn run(&self) -> Result<VerifyReport> {
        info!("🔍 Starting verification");
        let photos = self.spots.photos();
        let spots = self.spots.list().await?;

        let mut report = VerifyReport {
            spots: spots.len(),
            ..Default::default()
        };

        for key in spots.iter().filter_map(|s| s.photo_key.as_deref()) {
            report.photos_checked += 1;
            match photos.load(key).await {
                Ok(Some(_)) => report.photos_ok += 1,
                Ok(None) => {
                    warn!(key, "photo missing");
                    report.missing.push(key.to_string());
                }
                Err(e) if e.is_corrupt() => {
                    warn!(key, "photo corrupt: {}", e);
                    report.corrupt.push(key.to_string());
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(
            checked = report.photos_checked,
            ok = report.photos_ok,
            "Verification complete"
        );
        Ok(report)
    }
}
