//! CART trees: the shared building block of every tree-ensemble estimator.
//!
//! One node store serves both uses: classification trees split on weighted
//! Gini impurity and hold the positive-class fraction in their leaves;
//! regression trees split on weighted variance and hold the weighted mean.
//! Split quality is scored from the (w, wy, wyy) moment sums, so the two
//! criteria share a single split finder.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct TreeParams {
    /// Maximum tree depth; the root is depth 0.
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    pub min_samples_split: usize,
    /// Number of features tried per split; `None` tries all of them.
    pub max_features: Option<usize>,
    /// Draw one random threshold per feature instead of scanning all
    /// candidate thresholds (extremely-randomised splitting).
    pub random_splits: bool,
}

impl Default for TreeParams {
    fn default() -> Self {
        TreeParams {
            max_depth: 16,
            min_samples_leaf: 1,
            min_samples_split: 2,
            max_features: None,
            random_splits: false,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        /// Dense leaf slot, 0..n_leaves in creation order.
        slot: usize,
        value: f64,
    },
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    n_leaves: usize,
    n_features: usize,
    /// Unnormalised impurity decrease accumulated per feature.
    importance: Array1<f64>,
}

impl DecisionTree {
    /// Fit a binary classification tree. `y` must hold 0/1 values;
    /// `weights`, when given, must be non-negative and parallel to `y`.
    pub fn fit_classifier(
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        weights: Option<&[f64]>,
        params: &TreeParams,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        Self::fit(x, y, weights, params, rng)
    }

    /// Fit a regression tree on continuous targets.
    pub fn fit_regressor(
        x: &ArrayView2<f64>,
        targets: &ArrayView1<f64>,
        params: &TreeParams,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        Self::fit(x, targets, None, params, rng)
    }

    fn fit(
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        weights: Option<&[f64]>,
        params: &TreeParams,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        let n = x.nrows();
        if n == 0 {
            return Err(Error::Estimator("cannot fit a tree on zero records".into()));
        }
        if y.len() != n {
            return Err(Error::Estimator(format!(
                "{} targets for {} records",
                y.len(),
                n
            )));
        }
        if let Some(w) = weights {
            if w.len() != n {
                return Err(Error::Estimator(format!(
                    "{} sample weights for {} records",
                    w.len(),
                    n
                )));
            }
        }
        let mut tree = DecisionTree {
            nodes: Vec::new(),
            n_leaves: 0,
            n_features: x.ncols(),
            importance: Array1::zeros(x.ncols()),
        };
        let rows: Vec<usize> = (0..n).collect();
        tree.grow(x, y, weights, rows, 0, params, rng);
        Ok(tree)
    }

    #[allow(clippy::too_many_arguments)]
    fn grow(
        &mut self,
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        weights: Option<&[f64]>,
        rows: Vec<usize>,
        depth: usize,
        params: &TreeParams,
        rng: &mut impl Rng,
    ) -> usize {
        let moments = Moments::over(&rows, y, weights);
        let stop = depth >= params.max_depth
            || rows.len() < params.min_samples_split
            || moments.impurity() <= 1e-12;
        if !stop {
            if let Some(split) = self.best_split(x, y, weights, &rows, params, rng) {
                let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
                    .into_iter()
                    .partition(|&row| x[[row, split.feature]] <= split.threshold);
                if left_rows.len() >= params.min_samples_leaf
                    && right_rows.len() >= params.min_samples_leaf
                {
                    self.importance[split.feature] += split.gain;
                    let index = self.nodes.len();
                    self.nodes.push(Node::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left: 0,
                        right: 0,
                    });
                    let left = self.grow(x, y, weights, left_rows, depth + 1, params, rng);
                    let right = self.grow(x, y, weights, right_rows, depth + 1, params, rng);
                    if let Node::Split {
                        left: l, right: r, ..
                    } = &mut self.nodes[index]
                    {
                        *l = left;
                        *r = right;
                    }
                    return index;
                }
            }
        }
        let index = self.nodes.len();
        self.nodes.push(Node::Leaf {
            slot: self.n_leaves,
            value: moments.mean(),
        });
        self.n_leaves += 1;
        index
    }

    fn best_split(
        &self,
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        weights: Option<&[f64]>,
        rows: &[usize],
        params: &TreeParams,
        rng: &mut impl Rng,
    ) -> Option<SplitChoice> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        if let Some(k) = params.max_features {
            features.shuffle(rng);
            features.truncate(k.clamp(1, self.n_features));
        }
        let parent = Moments::over(rows, y, weights);
        let parent_impurity = parent.impurity();

        let mut best: Option<SplitChoice> = None;
        for &feature in &features {
            let candidate = if params.random_splits {
                self.random_threshold(x, rows, feature, rng)
            } else {
                self.scan_thresholds(x, y, weights, rows, feature)
            };
            let Some(threshold) = candidate else { continue };
            let (left, right) = Moments::split(rows, x, y, weights, feature, threshold);
            if left.count == 0 || right.count == 0 {
                continue;
            }
            let gain = parent_impurity - left.impurity() - right.impurity();
            if gain > best.as_ref().map_or(1e-12, |b| b.gain) {
                best = Some(SplitChoice {
                    feature,
                    threshold,
                    gain,
                });
            }
        }
        best
    }

    /// Exhaustive threshold scan: sort the rows by feature value and score
    /// every midpoint between distinct neighbours, returning the best.
    fn scan_thresholds(
        &self,
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        weights: Option<&[f64]>,
        rows: &[usize],
        feature: usize,
    ) -> Option<f64> {
        let mut order: Vec<usize> = rows.to_vec();
        order.sort_by(|&a, &b| {
            x[[a, feature]]
                .partial_cmp(&x[[b, feature]])
                .expect("finite feature values")
        });
        let total = Moments::over(&order, y, weights);
        let mut left = Moments::default();
        let mut best_score = f64::INFINITY;
        let mut best_threshold = None;
        for pair in order.windows(2) {
            let (row, next) = (pair[0], pair[1]);
            left.push(row, y, weights);
            let (a, b) = (x[[row, feature]], x[[next, feature]]);
            if a == b {
                continue;
            }
            let right = total.minus(&left);
            let score = left.impurity() + right.impurity();
            if score < best_score {
                best_score = score;
                best_threshold = Some((a + b) / 2.0);
            }
        }
        best_threshold
    }

    fn random_threshold(
        &self,
        x: &ArrayView2<f64>,
        rows: &[usize],
        feature: usize,
        rng: &mut impl Rng,
    ) -> Option<f64> {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &row in rows {
            lo = lo.min(x[[row, feature]]);
            hi = hi.max(x[[row, feature]]);
        }
        if hi <= lo {
            return None;
        }
        Some(rng.gen_range(lo..hi))
    }

    /// Leaf value for one record: positive-class fraction for classifiers,
    /// fitted mean for regressors.
    pub fn predict_value(&self, row: &ArrayView1<f64>) -> f64 {
        match self.nodes[self.leaf_node(row)] {
            Node::Leaf { value, .. } => value,
            Node::Split { .. } => unreachable!("leaf_node returns a leaf"),
        }
    }

    /// Dense leaf slot (0..n_leaves) the record lands in.
    pub fn leaf_slot(&self, row: &ArrayView1<f64>) -> usize {
        match self.nodes[self.leaf_node(row)] {
            Node::Leaf { slot, .. } => slot,
            Node::Split { .. } => unreachable!("leaf_node returns a leaf"),
        }
    }

    fn leaf_node(&self, row: &ArrayView1<f64>) -> usize {
        let mut index = 0;
        loop {
            match self.nodes[index] {
                Node::Leaf { .. } => return index,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.n_leaves
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Replace every leaf value via its dense slot. Used by the boosting
    /// stage to install Newton leaf updates after a residual fit.
    pub(crate) fn set_leaf_values(&mut self, values: &[f64]) {
        for node in &mut self.nodes {
            if let Node::Leaf { slot, value } = node {
                *value = values[*slot];
            }
        }
    }

    /// Raw (unnormalised) impurity-decrease totals per feature.
    pub(crate) fn raw_importance(&self) -> &Array1<f64> {
        &self.importance
    }

    /// Impurity-decrease feature importances, normalised to sum to one.
    /// A tree with no splits has no importances to report.
    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        let total: f64 = self.importance.sum();
        if total <= 0.0 {
            return None;
        }
        Some(&self.importance / total)
    }
}

struct SplitChoice {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Weighted moment sums (Σw, Σwy, Σwy²) of a row subset. Both impurity
/// criteria reduce to `Σwy² - (Σwy)²/Σw` up to a constant factor, with the
/// classification case using y ∈ {0, 1} so that y² = y.
#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    count: usize,
    w: f64,
    wy: f64,
    wyy: f64,
}

impl Moments {
    fn over(rows: &[usize], y: &ArrayView1<f64>, weights: Option<&[f64]>) -> Self {
        let mut m = Moments::default();
        for &row in rows {
            m.push(row, y, weights);
        }
        m
    }

    fn push(&mut self, row: usize, y: &ArrayView1<f64>, weights: Option<&[f64]>) {
        let w = weights.map_or(1.0, |w| w[row]);
        self.count += 1;
        self.w += w;
        self.wy += w * y[row];
        self.wyy += w * y[row] * y[row];
    }

    fn minus(&self, other: &Moments) -> Moments {
        Moments {
            count: self.count - other.count,
            w: self.w - other.w,
            wy: self.wy - other.wy,
            wyy: self.wyy - other.wyy,
        }
    }

    fn split(
        rows: &[usize],
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        weights: Option<&[f64]>,
        feature: usize,
        threshold: f64,
    ) -> (Moments, Moments) {
        let mut left = Moments::default();
        let mut right = Moments::default();
        for &row in rows {
            if x[[row, feature]] <= threshold {
                left.push(row, y, weights);
            } else {
                right.push(row, y, weights);
            }
        }
        (left, right)
    }

    fn impurity(&self) -> f64 {
        if self.w <= 0.0 {
            return 0.0;
        }
        (self.wyy - self.wy * self.wy / self.w).max(0.0)
    }

    fn mean(&self) -> f64 {
        if self.w <= 0.0 {
            0.0
        } else {
            self.wy / self.w
        }
    }
}
