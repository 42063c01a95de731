use anyhow::Result;
use std::path::Path;

use crate::params::AnchorCfg;

pub fn check_kmeans(k: usize, max_iterations: usize) -> Result<()> {
    anyhow::ensure!(k >= 1, "kmeans.k must be >= 1");
    anyhow::ensure!(k <= 64, "kmeans.k unusually large for anchors (max 64)");
    anyhow::ensure!(max_iterations >= 1, "kmeans.max_iterations must be >= 1");
    Ok(())
}

pub fn check_dataset(path: &Path, resize_to: Option<u32>) -> Result<()> {
    anyhow::ensure!(path.is_file(), "dataset.path {} is not a file", path.display());
    if let Some(r) = resize_to {
        anyhow::ensure!(r >= 32, "dataset.resize_to too small");
    }
    Ok(())
}

pub fn check_anchor_cfg(cfg: &AnchorCfg) -> Result<()> {
    anyhow::ensure!(cfg.base_scale > 0.0, "anchors.base_scale must be positive");
    anyhow::ensure!(cfg.stride >= 1.0, "anchors.stride must be >= 1");
    Ok(())
}
