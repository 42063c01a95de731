use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorEntry {
    pub w: f64,
    pub h: f64,
    /// h / (base_scale * stride)
    pub scale: f64,
    /// w / h
    pub ratio: f64,
    pub members: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterReport {
    pub ts_unix_ms: i64,
    pub source: String,
    pub bucket: String,
    pub num_boxes: usize,
    pub k: usize,
    pub aggregator: String,
    pub seed: Option<u64>,
    pub iterations: usize,
    pub converged: bool,
    pub avg_iou: f64,
    pub anchors: Vec<AnchorEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreReport {
    pub ts_unix_ms: i64,
    pub source: String,
    pub bucket: String,
    pub num_boxes: usize,
    pub avg_iou: f64,
    pub anchors: Vec<AnchorEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub k: usize,
    pub avg_iou: f64,
    pub iterations: usize,
    pub converged: bool,
}
