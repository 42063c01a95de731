use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

use anchor_kmeans::BoxShape;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Rescale every box as if its image were resized so the longer side is
    /// `resize_to` pixels (COCO input only).
    pub resize_to: Option<u32>,
    /// Skip `iscrowd=1` annotations.
    pub skip_crowd: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { resize_to: None, skip_crowd: true }
    }
}

#[derive(Debug, Deserialize)]
struct CocoFile {
    #[serde(default)]
    images: Vec<CocoImage>,
    annotations: Vec<CocoAnnotation>,
}

#[derive(Debug, Deserialize)]
struct CocoImage {
    id: u64,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct CocoAnnotation {
    image_id: u64,
    bbox: [f64; 4], // x, y, w, h
    #[serde(default)]
    iscrowd: u8,
}

/// Load ground-truth box shapes from disk.
///
/// - `*.json`: COCO detection annotations, `bbox = [x, y, w, h]` -> `(w, h)`
/// - anything else: one `width,height` (or `width height`) pair per line,
///   blank lines and `#` comments ignored
///
/// Boxes without area are dropped (and counted in a warning).
pub fn load_boxes(path: &Path, opts: &LoadOptions) -> Result<Vec<BoxShape>> {
    let s = std::fs::read_to_string(path).with_context(|| format!("read annotations {}", path.display()))?;

    let raw = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_coco(&s, opts).with_context(|| format!("parse coco json {}", path.display()))?,
        _ => {
            if opts.resize_to.is_some() {
                warn!("annotations: resize_to ignored for plain box list {}", path.display());
            }
            parse_pairs(&s).with_context(|| format!("parse box list {}", path.display()))?
        }
    };

    let total = raw.len();
    let boxes: Vec<BoxShape> = raw.into_iter().filter(BoxShape::is_valid).collect();
    if boxes.len() < total {
        warn!("annotations: dropped {} of {} boxes without area", total - boxes.len(), total);
    }
    anyhow::ensure!(!boxes.is_empty(), "no usable boxes in {}", path.display());

    info!("annotations: loaded {} boxes from {}", boxes.len(), path.display());
    Ok(boxes)
}

fn parse_coco(s: &str, opts: &LoadOptions) -> Result<Vec<BoxShape>> {
    let coco: CocoFile = serde_json::from_str(s)?;
    let longest_side: HashMap<u64, u32> = coco.images.iter().map(|im| (im.id, im.width.max(im.height))).collect();

    let mut out = Vec::with_capacity(coco.annotations.len());
    for a in &coco.annotations {
        if opts.skip_crowd && a.iscrowd != 0 {
            continue;
        }
        let shape = BoxShape::new(a.bbox[2], a.bbox[3]);
        let shape = match opts.resize_to {
            Some(target) => {
                let side = longest_side
                    .get(&a.image_id)
                    .with_context(|| format!("annotation refers to unknown image {}", a.image_id))?;
                anyhow::ensure!(*side > 0, "image {} has zero size", a.image_id);
                shape.scaled(target as f64 / *side as f64)
            }
            None => shape,
        };
        out.push(shape);
    }
    Ok(out)
}

fn parse_pairs(s: &str) -> Result<Vec<BoxShape>> {
    let mut out = Vec::new();
    for (n, line) in s.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect();
        anyhow::ensure!(parts.len() == 2, "line {}: expected `width,height`, got {:?}", n + 1, line);
        let w: f64 = parts[0].parse().with_context(|| format!("line {}: bad width", n + 1))?;
        let h: f64 = parts[1].parse().with_context(|| format!("line {}: bad height", n + 1))?;
        out.push(BoxShape::new(w, h));
    }
    Ok(out)
}
