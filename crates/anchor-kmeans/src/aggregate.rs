use crate::BoxShape;

/// Collapses the members of one cluster into its representative box.
///
/// Called once per non-empty cluster per update step; `members` is never empty
/// when invoked from [`crate::KMeans`]. Widths and heights are expected to be
/// aggregated independently.
pub trait Aggregator {
    fn aggregate(&self, members: &[BoxShape]) -> BoxShape;
}

impl<F> Aggregator for F
where
    F: Fn(&[BoxShape]) -> BoxShape,
{
    fn aggregate(&self, members: &[BoxShape]) -> BoxShape {
        self(members)
    }
}

/// Per-dimension median. Even-sized clusters take the mean of the two middle values.
#[derive(Debug, Clone, Copy, Default)]
pub struct Median;

/// Per-dimension arithmetic mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mean;

impl Aggregator for Median {
    fn aggregate(&self, members: &[BoxShape]) -> BoxShape {
        let mut ws: Vec<f64> = members.iter().map(|b| b.w).collect();
        let mut hs: Vec<f64> = members.iter().map(|b| b.h).collect();
        BoxShape::new(median(&mut ws), median(&mut hs))
    }
}

impl Aggregator for Mean {
    fn aggregate(&self, members: &[BoxShape]) -> BoxShape {
        let n = members.len() as f64;
        let (sw, sh) = members.iter().fold((0.0, 0.0), |(sw, sh), b| (sw + b.w, sh + b.h));
        BoxShape::new(sw / n, sh / n)
    }
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}
