pub mod annotations;
pub mod bucket;
pub mod doctor;
pub mod params;

pub use annotations::{load_boxes, LoadOptions};
pub use bucket::{filter_bucket, SizeBucket};
pub use params::anchor_params;
