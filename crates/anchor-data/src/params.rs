use anyhow::Result;
use serde::Deserialize;

use anchor_kmeans::BoxShape;
use anchor_proto::report::AnchorEntry;

#[derive(Debug, Clone, Deserialize)]
pub struct AnchorCfg {
    /// Detector's base anchor scale (e.g. 4.0 for EfficientDet-style heads).
    #[serde(default = "default_base_scale")]
    pub base_scale: f64,
    /// Feature stride the anchors are expressed against, in pixels.
    #[serde(default = "default_stride")]
    pub stride: f64,
}

fn default_base_scale() -> f64 { 4.0 }
fn default_stride() -> f64 { 8.0 }

impl Default for AnchorCfg {
    fn default() -> Self {
        Self { base_scale: default_base_scale(), stride: default_stride() }
    }
}

/// Turn cluster centroids into anchor scale/ratio pairs, smallest area first.
///
/// `members`, when given, is the cluster size per centroid (same order as
/// `centroids`) and travels with each entry through the sort.
pub fn anchor_params(centroids: &[BoxShape], members: Option<&[usize]>, cfg: &AnchorCfg) -> Result<Vec<AnchorEntry>> {
    anyhow::ensure!(cfg.base_scale > 0.0, "anchors.base_scale must be positive");
    anyhow::ensure!(cfg.stride > 0.0, "anchors.stride must be positive");
    if let Some(m) = members {
        anyhow::ensure!(m.len() == centroids.len(), "{} member counts for {} centroids", m.len(), centroids.len());
    }

    let mut out: Vec<AnchorEntry> = centroids
        .iter()
        .enumerate()
        .map(|(i, c)| AnchorEntry {
            w: c.w,
            h: c.h,
            scale: c.h / (cfg.base_scale * cfg.stride),
            ratio: c.aspect_ratio(),
            members: members.map(|m| m[i]),
        })
        .collect();
    out.sort_by(|a, b| (a.w * a.h).total_cmp(&(b.w * b.h)));
    Ok(out)
}
