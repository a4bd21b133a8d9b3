//! Gradient-boosted trees with a logistic loss.
//!
//! Each stage fits a regression tree to the current residuals and then
//! replaces its leaf values with the Newton step Σr / Σp(1-p) over the
//! records in that leaf. Besides classification, a fitted model exposes the
//! per-tree leaf slot of any record, which the meta-estimator pipeline
//! one-hot encodes as its derived feature space.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, Result};

use super::tree::{DecisionTree, TreeParams};

#[derive(Debug, Clone)]
pub struct GbtParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    /// Fraction of records fed to each stage; 1.0 disables subsampling.
    pub subsample: f64,
    pub tree: TreeParams,
}

impl Default for GbtParams {
    fn default() -> Self {
        GbtParams {
            n_estimators: 100,
            learning_rate: 0.1,
            subsample: 1.0,
            tree: TreeParams {
                max_depth: 3,
                ..TreeParams::default()
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct GradientBoostedTrees {
    base_score: f64,
    learning_rate: f64,
    trees: Vec<DecisionTree>,
    importance: Option<Array1<f64>>,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl GradientBoostedTrees {
    pub fn fit(
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        params: &GbtParams,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        if params.n_estimators == 0 {
            return Err(Error::Estimator("boosting needs at least one stage".into()));
        }
        if !(0.0 < params.subsample && params.subsample <= 1.0) {
            return Err(Error::Estimator(format!(
                "subsample fraction {} outside (0, 1]",
                params.subsample
            )));
        }
        let n = x.nrows();
        let positives = y.iter().filter(|&&v| v == 1.0).count();
        // Base score is the log-odds of the prior, kept away from the
        // degenerate single-class endpoints.
        let prior = ((positives as f64 + 0.5) / (n as f64 + 1.0)).clamp(1e-6, 1.0 - 1e-6);
        let base_score = (prior / (1.0 - prior)).ln();

        let mut raw = Array1::from_elem(n, base_score);
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut importance = Array1::zeros(x.ncols());
        let mut all_rows: Vec<usize> = (0..n).collect();

        for _ in 0..params.n_estimators {
            let probs: Array1<f64> = raw.mapv(sigmoid);
            let residuals: Array1<f64> = y - &probs;

            let rows: &[usize] = if params.subsample < 1.0 {
                all_rows.shuffle(rng);
                let take = ((n as f64 * params.subsample).round() as usize).max(1);
                &all_rows[..take]
            } else {
                &all_rows
            };
            let xs = x.select(ndarray::Axis(0), rows);
            let rs = residuals.select(ndarray::Axis(0), rows);
            let mut tree =
                DecisionTree::fit_regressor(&xs.view(), &rs.view(), &params.tree, rng)?;

            // Newton leaf update over the stage's records.
            let mut numer = vec![0.0; tree.n_leaves()];
            let mut denom = vec![0.0; tree.n_leaves()];
            for (local, &row) in rows.iter().enumerate() {
                let slot = tree.leaf_slot(&xs.row(local));
                numer[slot] += residuals[row];
                denom[slot] += probs[row] * (1.0 - probs[row]);
            }
            let values: Vec<f64> = numer
                .iter()
                .zip(&denom)
                .map(|(&num, &den)| if den > 1e-12 { num / den } else { 0.0 })
                .collect();
            tree.set_leaf_values(&values);

            for (row, r) in raw.iter_mut().enumerate() {
                *r += params.learning_rate * tree.predict_value(&x.row(row));
            }
            importance += tree.raw_importance();
            trees.push(tree);
        }
        let total = importance.sum();
        let importance = (total > 0.0).then(|| importance / total);
        Ok(GradientBoostedTrees {
            base_score,
            learning_rate: params.learning_rate,
            trees,
            importance,
        })
    }

    fn raw_score(&self, row: &ArrayView1<f64>) -> f64 {
        let boost: f64 = self
            .trees
            .iter()
            .map(|tree| tree.predict_value(row))
            .sum();
        self.base_score + self.learning_rate * boost
    }

    pub fn predict_proba(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        Array1::from_iter((0..x.nrows()).map(|row| sigmoid(self.raw_score(&x.row(row)))))
    }

    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        self.importance.clone()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Leaf counts per tree, defining the width of the one-hot leaf space.
    pub fn leaf_counts(&self) -> Vec<usize> {
        self.trees.iter().map(DecisionTree::n_leaves).collect()
    }

    /// The per-tree dense leaf slot of every record: shape (records, trees).
    pub fn apply(&self, x: &ArrayView2<f64>) -> Array2<usize> {
        let mut slots = Array2::zeros((x.nrows(), self.trees.len()));
        for (column, tree) in self.trees.iter().enumerate() {
            for row in 0..x.nrows() {
                slots[[row, column]] = tree.leaf_slot(&x.row(row));
            }
        }
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn two_blobs() -> (Array2<f64>, Array1<f64>) {
        let mut x = Array2::zeros((60, 2));
        let mut y = Array1::zeros(60);
        for i in 0..60 {
            let cls = (i % 2) as f64;
            x[[i, 0]] = cls * 4.0 + ((i / 2) as f64 * 0.07);
            x[[i, 1]] = ((i * 13) % 7) as f64 * 0.3;
            y[i] = cls;
        }
        (x, y)
    }

    #[test]
    fn boosting_fits_separable_blobs() {
        let (x, y) = two_blobs();
        let mut rng = StdRng::seed_from_u64(9);
        let params = GbtParams {
            n_estimators: 30,
            ..GbtParams::default()
        };
        let model = GradientBoostedTrees::fit(&x.view(), &y.view(), &params, &mut rng).unwrap();
        let probs = model.predict_proba(&x.view());
        for (row, &label) in y.iter().enumerate() {
            assert_eq!(probs[row] >= 0.5, label == 1.0, "row {row}");
        }
    }

    #[test]
    fn apply_reports_one_slot_per_tree() {
        let (x, y) = two_blobs();
        let mut rng = StdRng::seed_from_u64(9);
        let params = GbtParams {
            n_estimators: 5,
            ..GbtParams::default()
        };
        let model = GradientBoostedTrees::fit(&x.view(), &y.view(), &params, &mut rng).unwrap();
        let slots = model.apply(&x.view());
        assert_eq!(slots.shape(), &[60, 5]);
        let counts = model.leaf_counts();
        for row in 0..60 {
            for tree in 0..5 {
                assert!(slots[[row, tree]] < counts[tree]);
            }
        }
    }

    #[test]
    fn probabilities_stay_in_unit_interval() {
        let (x, y) = two_blobs();
        let mut rng = StdRng::seed_from_u64(2);
        let model =
            GradientBoostedTrees::fit(&x.view(), &y.view(), &GbtParams::default(), &mut rng)
                .unwrap();
        for &p in model.predict_proba(&x.view()).iter() {
            assert!((0.0..=1.0).contains(&p));
        }
    }
}
