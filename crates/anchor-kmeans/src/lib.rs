mod error;
pub mod accuracy;
pub mod aggregate;
pub mod iou;
pub mod kmeans;

pub use accuracy::average_best_iou;
pub use aggregate::{Aggregator, Mean, Median};
pub use error::{Error, Result};
pub use iou::{iou, iou_pair};
pub use kmeans::{assign, kmeans, Clustering, EmptyClusterPolicy, KMeans, KMeansConfig};

use serde::{Deserialize, Serialize};

/// Box shape anchored at the origin: only width and height matter.
///
/// Any ground-truth box `[x, y, w, h]` becomes `BoxShape { w, h }` once it is
/// translated so its top-left corner sits at (0, 0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxShape {
    pub w: f64,
    pub h: f64,
}

impl BoxShape {
    pub const fn new(w: f64, h: f64) -> Self {
        Self { w, h }
    }

    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    /// Both sides strictly positive (NaN is invalid).
    pub fn is_valid(&self) -> bool {
        self.w > 0.0 && self.h > 0.0
    }

    /// width / height
    pub fn aspect_ratio(&self) -> f64 {
        self.w / self.h
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self { w: self.w * factor, h: self.h * factor }
    }
}

impl From<(f64, f64)> for BoxShape {
    fn from((w, h): (f64, f64)) -> Self {
        Self { w, h }
    }
}

impl From<[f64; 2]> for BoxShape {
    fn from([w, h]: [f64; 2]) -> Self {
        Self { w, h }
    }
}
