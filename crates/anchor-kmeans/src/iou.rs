use crate::{BoxShape, Error, Result};

/// IoU of `shape` against every reference, assuming each pair shares its
/// top-left corner. Output order follows `references`.
///
/// Fails with [`Error::InvalidInput`] as soon as an intersection side is not
/// strictly positive, which means one side of the pair has no area.
pub fn iou(shape: BoxShape, references: &[BoxShape]) -> Result<Vec<f64>> {
    references
        .iter()
        .enumerate()
        .map(|(index, &reference)| {
            corner_iou(shape, reference).ok_or(Error::InvalidInput { index, shape, reference })
        })
        .collect()
}

/// Single-pair form of [`iou`].
pub fn iou_pair(a: BoxShape, b: BoxShape) -> Result<f64> {
    corner_iou(a, b).ok_or(Error::InvalidInput { index: 0, shape: a, reference: b })
}

fn corner_iou(a: BoxShape, b: BoxShape) -> Option<f64> {
    let iw = a.w.min(b.w);
    let ih = a.h.min(b.h);
    // also catches NaN
    if !(iw > 0.0 && ih > 0.0) {
        return None;
    }
    let inter = iw * ih;
    Some(inter / (a.area() + b.area() - inter))
}
