use crate::{iou, BoxShape, Error, Result};

/// Mean over `boxes` of the best IoU each box reaches against any representative.
pub fn average_best_iou(boxes: &[BoxShape], representatives: &[BoxShape]) -> Result<f64> {
    if boxes.is_empty() {
        return Err(Error::EmptyDataset);
    }
    if representatives.is_empty() {
        return Err(Error::NoRepresentatives);
    }

    let mut total = 0.0;
    for &b in boxes {
        let best = iou(b, representatives)?.into_iter().fold(0.0f64, f64::max);
        total += best;
    }
    Ok(total / boxes.len() as f64)
}
