use anyhow::Result;

use anchor_kmeans::BoxShape;

/// COCO size split on box area.
pub const SMALL_MAX_AREA: f64 = 32.0 * 32.0;
pub const MEDIUM_MAX_AREA: f64 = 96.0 * 96.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeBucket {
    All,
    Small,
    Medium,
    Large,
}

impl SizeBucket {
    pub fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "all" => SizeBucket::All,
            "small" => SizeBucket::Small,
            "medium" => SizeBucket::Medium,
            "large" => SizeBucket::Large,
            other => anyhow::bail!("unknown size bucket: {}", other),
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeBucket::All => "all",
            SizeBucket::Small => "small",
            SizeBucket::Medium => "medium",
            SizeBucket::Large => "large",
        }
    }

    pub fn contains(&self, b: &BoxShape) -> bool {
        let a = b.area();
        match self {
            SizeBucket::All => true,
            SizeBucket::Small => a < SMALL_MAX_AREA,
            SizeBucket::Medium => (SMALL_MAX_AREA..MEDIUM_MAX_AREA).contains(&a),
            SizeBucket::Large => a >= MEDIUM_MAX_AREA,
        }
    }
}

pub fn filter_bucket(boxes: &[BoxShape], bucket: SizeBucket) -> Vec<BoxShape> {
    boxes.iter().copied().filter(|b| bucket.contains(b)).collect()
}
