//! Isolation forest over standardized feature vectors.
//!
//! ## Algorithm
//!
//! Each tree is grown on a subsample of `ψ = min(max_samples, n)` rows drawn
//! without replacement. Nodes split on a random feature at a threshold drawn
//! uniformly between that feature's min and max in the node, until the node
//! holds one row or the depth limit `ceil(log2 ψ)` is reached. Outliers are
//! isolated closer to the root.
//!
//! - path length `h(x)` = depth of the leaf reached + `c(leaf size)`
//! - anomaly score `s(x) = 2^(-E[h(x)] / c(ψ))`, in (0, 1], higher = stranger
//! - `score_samples(x) = -s(x)`
//! - `offset` = `contamination` quantile of the training `score_samples`
//! - `decision(x) = score_samples(x) - offset`; negative means anomalous
//!
//! Trees are stored as flat node arenas so the whole forest serializes as
//! plain data.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful binary-search-tree lookup among
/// `n` points, the normalizer of isolation depth.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        size: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn grow(data: &[Vec<f64>], rows: Vec<usize>, max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.build(data, rows, 0, max_depth, rng);
        tree
    }

    /// Append the subtree for `rows` and return its node index.
    fn build(
        &mut self,
        data: &[Vec<f64>],
        rows: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });
        if depth >= max_depth || rows.len() <= 1 {
            return idx;
        }

        let Some((feature, threshold)) = choose_split(data, &rows, rng) else {
            return idx;
        };
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| data[r][feature] <= threshold);

        let left = self.build(data, left_rows, depth + 1, max_depth, rng);
        let right = self.build(data, right_rows, depth + 1, max_depth, rng);
        self.nodes[idx] = Node::Split {
            feature,
            threshold,
            left,
            right,
        };
        idx
    }

    /// Isolation depth of `x`, corrected for unresolved leaf size.
    pub fn path_length(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        let mut depth = 0.0;
        while let Some(node) = self.nodes.get(idx) {
            match *node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if x[feature] <= threshold { left } else { right };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(size),
            }
        }
        depth
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Every child index points forward inside the arena and every split
    /// feature is below `dims`.
    fn is_consistent(&self, dims: usize) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(i, n)| match *n {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    feature < dims
                        && threshold.is_finite()
                        && left > i
                        && right > i
                        && left < self.nodes.len()
                        && right < self.nodes.len()
                }
                Node::Leaf { .. } => true,
            })
    }
}

/// Random non-constant feature and a uniform threshold inside its range.
/// Features are tried in random order; `None` when every feature is constant.
fn choose_split(data: &[Vec<f64>], rows: &[usize], rng: &mut StdRng) -> Option<(usize, f64)> {
    let dims = data.get(rows[0]).map_or(0, Vec::len);
    let mut candidates: Vec<usize> = (0..dims).collect();
    while !candidates.is_empty() {
        let feature = candidates.swap_remove(rng.gen_range(0..candidates.len()));
        let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
            (lo.min(data[r][feature]), hi.max(data[r][feature]))
        });
        if hi > lo {
            let threshold = rng.gen_range(lo..hi);
            return Some((feature, threshold));
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    /// Subsample size each tree was grown on
    sample_size: usize,
    /// Decision threshold on `score_samples`
    offset: f64,
}

impl IsolationForest {
    /// Fit on standardized rows. `data` must be non-empty.
    pub fn fit(
        data: &[Vec<f64>],
        n_estimators: usize,
        max_samples: usize,
        contamination: f64,
        seed: u64,
    ) -> Self {
        let n = data.len();
        let sample_size = max_samples.min(n).max(1);
        let max_depth = (sample_size.max(2) as f64).log2().ceil() as usize;

        // Per-tree seeds drawn sequentially keep the forest identical however
        // the trees are scheduled.
        let mut master = StdRng::seed_from_u64(seed);
        let tree_seeds: Vec<u64> = (0..n_estimators).map(|_| master.gen()).collect();

        let trees: Vec<IsolationTree> = tree_seeds
            .into_par_iter()
            .map(|tree_seed| {
                let mut rng = StdRng::seed_from_u64(tree_seed);
                let rows = sample(&mut rng, n, sample_size).into_vec();
                IsolationTree::grow(data, rows, max_depth, &mut rng)
            })
            .collect();

        let mut forest = Self {
            trees,
            sample_size,
            offset: 0.0,
        };
        let training_scores: Vec<f64> = data.par_iter().map(|x| forest.score_samples(x)).collect();
        forest.offset = percentile(&training_scores, 100.0 * contamination);
        forest
    }

    /// Negated anomaly score: lower is more anomalous.
    pub fn score_samples(&self, x: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return -1.0;
        }
        let mean_depth =
            self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64;
        let norm = average_path_length(self.sample_size);
        let norm = if norm > 0.0 { norm } else { 1.0 };
        -(2f64.powf(-mean_depth / norm))
    }

    /// Negative for anomalies.
    pub fn decision_function(&self, x: &[f64]) -> f64 {
        self.score_samples(x) - self.offset
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[IsolationTree] {
        &self.trees
    }

    pub fn is_consistent(&self, dims: usize) -> bool {
        self.offset.is_finite() && self.sample_size > 0 && self.trees.iter().all(|t| t.is_consistent(dims))
    }
}

/// Percentile with linear interpolation between closest ranks.
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
