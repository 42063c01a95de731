use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::{iou, Aggregator, BoxShape, Error, Median, Result};

/// Upper bound on assignment passes; ordinary datasets settle long before this.
pub const DEFAULT_MAX_ITERATIONS: usize = 300;

/// What to do with a cluster that received no boxes in an assignment pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyClusterPolicy {
    /// Keep the previous centroid as is.
    #[default]
    Freeze,
    /// Replace the centroid with a box drawn uniformly from the dataset.
    Reseed,
    /// Abort with [`Error::DegenerateCluster`].
    Fail,
}

#[derive(Debug, Clone)]
pub struct KMeansConfig {
    pub k: usize,
    pub max_iterations: usize,
    pub empty_cluster: EmptyClusterPolicy,
}

impl KMeansConfig {
    pub fn new(k: usize) -> Self {
        Self { k, max_iterations: DEFAULT_MAX_ITERATIONS, empty_cluster: EmptyClusterPolicy::default() }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_empty_cluster(mut self, policy: EmptyClusterPolicy) -> Self {
        self.empty_cluster = policy;
        self
    }
}

/// Result of one k-means run.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    pub centroids: Vec<BoxShape>,
    /// Cluster index per input box, nearest centroid in `centroids`.
    pub assignments: Vec<usize>,
    /// Number of assignment passes performed (the converging pass included).
    pub iterations: usize,
    /// False only when `max_iterations` was reached first.
    pub converged: bool,
}

impl Clustering {
    /// Member count per cluster.
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centroids.len()];
        for &c in &self.assignments {
            sizes[c] += 1;
        }
        sizes
    }
}

/// Lloyd's algorithm over box shapes with `1 - IoU` as the distance.
#[derive(Debug, Clone)]
pub struct KMeans<A = Median> {
    cfg: KMeansConfig,
    aggregator: A,
}

impl KMeans<Median> {
    pub fn new(cfg: KMeansConfig) -> Self {
        Self { cfg, aggregator: Median }
    }
}

impl<A: Aggregator> KMeans<A> {
    pub fn with_aggregator<B: Aggregator>(self, aggregator: B) -> KMeans<B> {
        KMeans { cfg: self.cfg, aggregator }
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.cfg
    }

    /// Forgy initialisation (k distinct boxes by index) followed by Lloyd iterations.
    ///
    /// Repeated box values in the dataset can produce repeated initial
    /// centroids; the run still completes but some clusters may stay empty.
    pub fn fit<R: Rng + ?Sized>(&self, boxes: &[BoxShape], rng: &mut R) -> Result<Clustering> {
        self.validate(boxes)?;
        let centroids: Vec<BoxShape> = boxes.choose_multiple(rng, self.cfg.k).copied().collect();
        debug!("kmeans: initial centroids {:?}", centroids);
        self.iterate(boxes, centroids, rng)
    }

    /// Same as [`KMeans::fit`] but starting from caller-chosen centroids.
    /// The RNG is only consulted by [`EmptyClusterPolicy::Reseed`].
    pub fn fit_from<R: Rng + ?Sized>(
        &self,
        boxes: &[BoxShape],
        initial: Vec<BoxShape>,
        rng: &mut R,
    ) -> Result<Clustering> {
        self.validate(boxes)?;
        if initial.len() != self.cfg.k {
            return Err(Error::InvalidConfiguration(format!(
                "{} initial centroids given for k={}",
                initial.len(),
                self.cfg.k
            )));
        }
        self.iterate(boxes, initial, rng)
    }

    fn validate(&self, boxes: &[BoxShape]) -> Result<()> {
        let k = self.cfg.k;
        if boxes.is_empty() {
            return Err(Error::InvalidConfiguration("empty box dataset".into()));
        }
        if k == 0 {
            return Err(Error::InvalidConfiguration("k must be positive".into()));
        }
        if k > boxes.len() {
            return Err(Error::InvalidConfiguration(format!(
                "k={} exceeds number of boxes ({})",
                k,
                boxes.len()
            )));
        }
        if self.cfg.max_iterations == 0 {
            return Err(Error::InvalidConfiguration("max_iterations must be positive".into()));
        }
        Ok(())
    }

    fn iterate<R: Rng + ?Sized>(
        &self,
        boxes: &[BoxShape],
        mut centroids: Vec<BoxShape>,
        rng: &mut R,
    ) -> Result<Clustering> {
        // Sentinel: everything in cluster 0, so at least one full pass runs.
        let mut previous = vec![0usize; boxes.len()];

        for iteration in 1..=self.cfg.max_iterations {
            let current = assign(boxes, &centroids)?;
            if current == previous {
                info!("kmeans: converged after {} iterations (k={}, n={})", iteration, self.cfg.k, boxes.len());
                return Ok(Clustering { centroids, assignments: current, iterations: iteration, converged: true });
            }

            let moved = current.iter().zip(&previous).filter(|(a, b)| a != b).count();
            debug!("kmeans: pass {} reassigned {} boxes", iteration, moved);

            self.update(boxes, &current, &mut centroids, iteration, rng)?;
            previous = current;
        }

        warn!("kmeans: no convergence within {} iterations, returning current centroids", self.cfg.max_iterations);
        // the last update moved the centroids; report the partition they induce
        let assignments = assign(boxes, &centroids)?;
        Ok(Clustering {
            centroids,
            assignments,
            iterations: self.cfg.max_iterations,
            converged: false,
        })
    }

    fn update<R: Rng + ?Sized>(
        &self,
        boxes: &[BoxShape],
        assignments: &[usize],
        centroids: &mut [BoxShape],
        iteration: usize,
        rng: &mut R,
    ) -> Result<()> {
        let mut members: Vec<Vec<BoxShape>> = vec![Vec::new(); centroids.len()];
        for (b, &c) in boxes.iter().zip(assignments) {
            members[c].push(*b);
        }

        for (c, group) in members.iter().enumerate() {
            if !group.is_empty() {
                centroids[c] = self.aggregator.aggregate(group);
                continue;
            }
            match self.cfg.empty_cluster {
                EmptyClusterPolicy::Freeze => {
                    debug!("kmeans: cluster {} empty on pass {}, centroid kept", c, iteration);
                }
                EmptyClusterPolicy::Reseed => {
                    if let Some(b) = boxes.choose(rng) {
                        warn!("kmeans: cluster {} empty on pass {}, reseeded with {:?}", c, iteration, b);
                        centroids[c] = *b;
                    }
                }
                EmptyClusterPolicy::Fail => {
                    return Err(Error::DegenerateCluster { cluster: c, iteration });
                }
            }
        }
        Ok(())
    }
}

/// Nearest centroid per box (`argmin 1 - IoU`, ties to the lowest index).
pub fn assign(boxes: &[BoxShape], centroids: &[BoxShape]) -> Result<Vec<usize>> {
    if centroids.is_empty() {
        return Err(Error::InvalidConfiguration("no centroids to assign to".into()));
    }
    boxes
        .iter()
        .map(|&b| {
            let mut best = 0;
            let mut best_d = f64::INFINITY;
            for (c, v) in iou(b, centroids)?.into_iter().enumerate() {
                let d = 1.0 - v;
                if d < best_d {
                    best_d = d;
                    best = c;
                }
            }
            Ok(best)
        })
        .collect()
}

/// Cluster `boxes` into `k` representative shapes.
///
/// Uses the default iteration cap and [`EmptyClusterPolicy::Freeze`]; hitting
/// the cap is reported as [`Error::NotConverged`]. Use [`KMeans`] directly for
/// the full outcome.
pub fn kmeans<A, R>(boxes: &[BoxShape], k: usize, aggregator: A, rng: &mut R) -> Result<Vec<BoxShape>>
where
    A: Aggregator,
    R: Rng + ?Sized,
{
    let out = KMeans::new(KMeansConfig::new(k)).with_aggregator(aggregator).fit(boxes, rng)?;
    if !out.converged {
        return Err(Error::NotConverged { iterations: out.iterations });
    }
    Ok(out.centroids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Mean;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn shapes(v: &[(f64, f64)]) -> Vec<BoxShape> {
        v.iter().copied().map(BoxShape::from).collect()
    }

    #[test]
    fn assign_breaks_ties_to_lowest_index() {
        let boxes = shapes(&[(4.0, 4.0)]);
        let centroids = shapes(&[(2.0, 2.0), (8.0, 8.0)]);
        // both 0.25
        assert_eq!(assign(&boxes, &centroids).unwrap(), vec![0]);
    }

    #[test]
    fn assign_without_centroids_fails() {
        assert!(matches!(assign(&shapes(&[(1.0, 1.0)]), &[]), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn rejects_bad_configurations_before_iterating() {
        let mut rng = StdRng::seed_from_u64(1);
        let boxes = shapes(&[(1.0, 1.0), (2.0, 2.0)]);
        for cfg in [KMeansConfig::new(0), KMeansConfig::new(3), KMeansConfig::new(1).with_max_iterations(0)] {
            let err = KMeans::new(cfg).fit(&boxes, &mut rng).unwrap_err();
            assert!(matches!(err, Error::InvalidConfiguration(_)), "{err:?}");
        }
        let err = KMeans::new(KMeansConfig::new(1)).fit(&[], &mut rng).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn fit_from_checks_centroid_count() {
        let mut rng = StdRng::seed_from_u64(1);
        let boxes = shapes(&[(1.0, 1.0), (2.0, 2.0)]);
        let err = KMeans::new(KMeansConfig::new(2)).fit_from(&boxes, shapes(&[(1.0, 1.0)]), &mut rng).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn two_obvious_groups_from_explicit_start() {
        let mut rng = StdRng::seed_from_u64(7);
        let boxes = shapes(&[(100.0, 100.0), (10.0, 10.0), (100.0, 100.0), (10.0, 10.0)]);
        let out = KMeans::new(KMeansConfig::new(2))
            .fit_from(&boxes, shapes(&[(100.0, 100.0), (10.0, 10.0)]), &mut rng)
            .unwrap();
        assert!(out.converged);
        assert_eq!(out.iterations, 2);
        assert_eq!(out.centroids, shapes(&[(100.0, 100.0), (10.0, 10.0)]));
        assert_eq!(out.assignments, vec![0, 1, 0, 1]);
        assert_eq!(out.cluster_sizes(), vec![2, 2]);
    }

    #[test]
    fn duplicate_start_leaves_second_cluster_frozen() {
        let mut rng = StdRng::seed_from_u64(7);
        let boxes = shapes(&[(100.0, 100.0), (100.0, 100.0), (10.0, 10.0), (12.0, 10.0)]);
        let start = shapes(&[(10.0, 10.0), (10.0, 10.0)]);
        let out = KMeans::new(KMeansConfig::new(2)).fit_from(&boxes, start, &mut rng).unwrap();
        // every box ties onto cluster 0, which equals the sentinel
        assert!(out.converged);
        assert_eq!(out.iterations, 1);
        assert_eq!(out.cluster_sizes(), vec![4, 0]);
        assert_eq!(out.centroids[1], BoxShape::new(10.0, 10.0));
    }

    #[test]
    fn empty_cluster_fail_policy_errors() {
        let mut rng = StdRng::seed_from_u64(7);
        let boxes = shapes(&[(100.0, 100.0), (10.0, 10.0), (10.0, 10.0)]);
        // cluster 1 wins box 0 on pass 1, cluster 2 loses every tie to cluster 0
        let start = shapes(&[(10.0, 10.0), (100.0, 100.0), (10.0, 10.0)]);
        let cfg = KMeansConfig::new(3).with_empty_cluster(EmptyClusterPolicy::Fail);
        let err = KMeans::new(cfg).fit_from(&boxes, start, &mut rng).unwrap_err();
        assert_eq!(err, Error::DegenerateCluster { cluster: 2, iteration: 1 });
    }

    // (11, 9) is not a dataset box and never wins a box.
    fn empty_third_cluster(policy: EmptyClusterPolicy) -> (Vec<BoxShape>, Clustering) {
        let mut rng = StdRng::seed_from_u64(3);
        let boxes = shapes(&[(100.0, 100.0), (10.0, 10.0), (10.0, 10.0)]);
        let start = shapes(&[(10.0, 10.0), (100.0, 100.0), (11.0, 9.0)]);
        let cfg = KMeansConfig::new(3).with_empty_cluster(policy).with_max_iterations(20);
        let out = KMeans::new(cfg).fit_from(&boxes, start, &mut rng).unwrap();
        (boxes, out)
    }

    #[test]
    fn empty_cluster_reseed_replaces_centroid_with_dataset_box() {
        let (boxes, out) = empty_third_cluster(EmptyClusterPolicy::Reseed);
        assert!(out.converged);
        assert_ne!(out.centroids[2], BoxShape::new(11.0, 9.0));
        for c in &out.centroids {
            assert!(boxes.contains(c), "centroid {c:?} not from dataset");
        }
    }

    #[test]
    fn empty_cluster_freeze_keeps_centroid() {
        let (_, out) = empty_third_cluster(EmptyClusterPolicy::Freeze);
        assert!(out.converged);
        assert_eq!(out.iterations, 2);
        assert_eq!(out.centroids, shapes(&[(10.0, 10.0), (100.0, 100.0), (11.0, 9.0)]));
        assert_eq!(out.cluster_sizes(), vec![2, 1, 0]);
    }

    #[test]
    fn mean_aggregator_moves_centroid_to_average() {
        let mut rng = StdRng::seed_from_u64(11);
        let boxes = shapes(&[(10.0, 10.0), (12.0, 14.0), (200.0, 200.0)]);
        let out = KMeans::new(KMeansConfig::new(2))
            .with_aggregator(Mean)
            .fit_from(&boxes, shapes(&[(10.0, 10.0), (200.0, 200.0)]), &mut rng)
            .unwrap();
        assert!(out.converged);
        assert_eq!(out.centroids, shapes(&[(11.0, 12.0), (200.0, 200.0)]));
    }

    #[test]
    fn iteration_cap_marks_result_unconverged() {
        let mut rng = StdRng::seed_from_u64(5);
        let boxes = shapes(&[(100.0, 100.0), (10.0, 10.0), (100.0, 100.0), (10.0, 10.0)]);
        let cfg = KMeansConfig::new(2).with_max_iterations(1);
        let out = KMeans::new(cfg).fit_from(&boxes, shapes(&[(100.0, 100.0), (10.0, 10.0)]), &mut rng).unwrap();
        assert!(!out.converged);
        assert_eq!(out.iterations, 1);
    }

    #[test]
    fn capped_result_assignments_match_returned_centroids() {
        let mut rng = StdRng::seed_from_u64(5);
        let boxes = shapes(&[(10.0, 10.0), (35.0, 35.0), (50.0, 50.0), (200.0, 200.0)]);
        let start = shapes(&[(10.0, 10.0), (200.0, 200.0)]);
        let cfg = KMeansConfig::new(2).with_max_iterations(1);
        let out = KMeans::new(cfg).fit_from(&boxes, start, &mut rng).unwrap();
        assert!(!out.converged);
        // pass 1 put (50, 50) in cluster 1; the updated centroids pull it into cluster 0
        assert_eq!(out.centroids, shapes(&[(22.5, 22.5), (125.0, 125.0)]));
        assert_eq!(out.assignments, vec![0, 0, 0, 1]);
        assert_eq!(out.assignments, assign(&boxes, &out.centroids).unwrap());
        assert_eq!(out.cluster_sizes(), vec![3, 1]);
    }

    #[test]
    fn invalid_box_surfaces_from_assignment() {
        let mut rng = StdRng::seed_from_u64(5);
        let boxes = shapes(&[(10.0, 0.0), (5.0, 5.0)]);
        let err = KMeans::new(KMeansConfig::new(1)).fit_from(&boxes, shapes(&[(5.0, 5.0)]), &mut rng).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
    }
}
