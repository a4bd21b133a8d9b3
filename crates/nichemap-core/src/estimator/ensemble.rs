//! Bagged and boosted-vote tree ensembles: random forests, extremely
//! randomised trees, and AdaBoost over shallow weighted trees.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::Rng;

use crate::error::{Error, Result};

use super::tree::{DecisionTree, TreeParams};

#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_trees: usize,
    /// Per-tree settings; `max_features` defaults to sqrt(n_features) at
    /// fit time when unset.
    pub tree: TreeParams,
    /// Bootstrap-resample the records for each tree. Extremely randomised
    /// trees conventionally fit on the full sample instead.
    pub bootstrap: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams {
            n_trees: 100,
            tree: TreeParams::default(),
            bootstrap: true,
        }
    }
}

/// A bag of classification trees whose probability is the mean of the
/// per-tree leaf fractions.
#[derive(Debug, Clone)]
pub struct Forest {
    trees: Vec<DecisionTree>,
    importance: Option<Array1<f64>>,
}

impl Forest {
    pub fn fit(
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        params: &ForestParams,
        random_splits: bool,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        if params.n_trees == 0 {
            return Err(Error::Estimator("forest needs at least one tree".into()));
        }
        let n = x.nrows();
        let mut tree_params = params.tree.clone();
        tree_params.random_splits = random_splits;
        if tree_params.max_features.is_none() {
            tree_params.max_features = Some(((x.ncols() as f64).sqrt().round() as usize).max(1));
        }

        let mut trees = Vec::with_capacity(params.n_trees);
        let mut importance = Array1::zeros(x.ncols());
        for _ in 0..params.n_trees {
            let tree = if params.bootstrap {
                let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                let xb = x.select(ndarray::Axis(0), &rows);
                let yb = y.select(ndarray::Axis(0), &rows);
                DecisionTree::fit_classifier(&xb.view(), &yb.view(), None, &tree_params, rng)?
            } else {
                DecisionTree::fit_classifier(x, y, None, &tree_params, rng)?
            };
            importance += tree.raw_importance();
            trees.push(tree);
        }
        let total = importance.sum();
        let importance = (total > 0.0).then(|| importance / total);
        Ok(Forest { trees, importance })
    }

    pub fn predict_proba(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        let mut probs = Array1::zeros(x.nrows());
        for tree in &self.trees {
            for (row, p) in probs.iter_mut().enumerate() {
                *p += tree.predict_value(&x.row(row));
            }
        }
        probs / self.trees.len() as f64
    }

    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        self.importance.clone()
    }
}

#[derive(Debug, Clone)]
pub struct AdaBoostParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    /// Base learner settings; the conventional base is a depth-1 stump.
    pub tree: TreeParams,
}

impl Default for AdaBoostParams {
    fn default() -> Self {
        AdaBoostParams {
            n_estimators: 50,
            learning_rate: 1.0,
            tree: TreeParams {
                max_depth: 1,
                ..TreeParams::default()
            },
        }
    }
}

/// Discrete AdaBoost over weighted classification trees. The reported
/// probability is the alpha-weighted vote fraction for the positive class.
#[derive(Debug, Clone)]
pub struct AdaBoost {
    stages: Vec<(f64, DecisionTree)>,
    importance: Option<Array1<f64>>,
}

impl AdaBoost {
    pub fn fit(
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        params: &AdaBoostParams,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        if params.n_estimators == 0 {
            return Err(Error::Estimator("AdaBoost needs at least one stage".into()));
        }
        let n = x.nrows();
        let mut weights = vec![1.0 / n as f64; n];
        let mut stages = Vec::new();
        let mut importance = Array1::zeros(x.ncols());

        for _ in 0..params.n_estimators {
            let tree =
                DecisionTree::fit_classifier(x, y, Some(&weights), &params.tree, rng)?;
            let miss: Vec<bool> = (0..n)
                .map(|row| (tree.predict_value(&x.row(row)) >= 0.5) != (y[row] == 1.0))
                .collect();
            let err: f64 = weights
                .iter()
                .zip(&miss)
                .filter(|(_, &m)| m)
                .map(|(&w, _)| w)
                .sum();
            if err >= 0.5 {
                // The stage is no better than chance; stop boosting.
                break;
            }
            let bounded = err.max(1e-12);
            let alpha = params.learning_rate * ((1.0 - bounded) / bounded).ln();
            for (w, &m) in weights.iter_mut().zip(&miss) {
                if m {
                    *w *= alpha.exp();
                }
            }
            let total: f64 = weights.iter().sum();
            for w in &mut weights {
                *w /= total;
            }
            importance.scaled_add(alpha, tree.raw_importance());
            stages.push((alpha, tree));
            if err <= 1e-12 {
                break;
            }
        }
        if stages.is_empty() {
            return Err(Error::Estimator(
                "AdaBoost found no stage better than chance".into(),
            ));
        }
        let total = importance.sum();
        let importance = (total > 0.0).then(|| importance / total);
        Ok(AdaBoost { stages, importance })
    }

    pub fn predict_proba(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        let alpha_total: f64 = self.stages.iter().map(|(a, _)| a).sum();
        let mut probs = Array1::zeros(x.nrows());
        for (alpha, tree) in &self.stages {
            for (row, p) in probs.iter_mut().enumerate() {
                if tree.predict_value(&x.row(row)) >= 0.5 {
                    *p += alpha;
                }
            }
        }
        probs / alpha_total
    }

    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        self.importance.clone()
    }
}
