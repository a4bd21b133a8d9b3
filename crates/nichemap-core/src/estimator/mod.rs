//! The estimator seam: every model the pipeline can fit, behind one
//! `fit` / `predict_proba` contract.
//!
//! Estimator choice is a closed sum type (`TreeEstimator` for the
//! single-stage tree pipelines, `MetaLearner` for the boosted-transform
//! meta pipeline), so an unsupported estimator cannot be expressed, let
//! alone reach a fit call. Feature importances are an optional capability:
//! models that cannot attribute features simply report `None`.

pub mod boost;
pub mod ensemble;
pub mod linear;
pub mod mlp;
pub mod tree;

pub use boost::{GbtParams, GradientBoostedTrees};
pub use ensemble::{AdaBoost, AdaBoostParams, Forest, ForestParams};
pub use linear::{LogisticParams, LogisticRegression};
pub use mlp::{MlpClassifier, MlpParams};
pub use tree::{DecisionTree, TreeParams};

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::Rng;

use crate::error::{Error, Result};

/// Uniform prediction contract shared by every fitted model.
pub trait Classifier {
    /// Positive-class probability per record.
    fn predict_proba(&self, x: &ArrayView2<f64>) -> Array1<f64>;

    /// Per-feature importances over the original predictor space, when the
    /// model can attribute them.
    fn feature_importances(&self) -> Option<Array1<f64>> {
        None
    }
}

/// Selection of a single-stage tree-ensemble estimator.
#[derive(Debug, Clone)]
pub enum TreeEstimator {
    DecisionTree(TreeParams),
    RandomForest(ForestParams),
    ExtraTrees(ForestParams),
    GradientBoosting(GbtParams),
    AdaBoost(AdaBoostParams),
}

impl TreeEstimator {
    /// Parse a CLI estimator name with default parameters.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "decision-tree" => Ok(TreeEstimator::DecisionTree(TreeParams::default())),
            "random-forest" => Ok(TreeEstimator::RandomForest(ForestParams::default())),
            "extra-trees" => Ok(TreeEstimator::ExtraTrees(ForestParams {
                bootstrap: false,
                ..ForestParams::default()
            })),
            "gradient-boosting" => Ok(TreeEstimator::GradientBoosting(GbtParams::default())),
            "adaboost" => Ok(TreeEstimator::AdaBoost(AdaBoostParams::default())),
            other => Err(Error::Estimator(format!(
                "unknown tree estimator '{other}' (expected decision-tree, random-forest, \
                 extra-trees, gradient-boosting, or adaboost)"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TreeEstimator::DecisionTree(_) => "decision-tree",
            TreeEstimator::RandomForest(_) => "random-forest",
            TreeEstimator::ExtraTrees(_) => "extra-trees",
            TreeEstimator::GradientBoosting(_) => "gradient-boosting",
            TreeEstimator::AdaBoost(_) => "adaboost",
        }
    }

    pub fn fit(
        &self,
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        rng: &mut impl Rng,
    ) -> Result<FittedTreeEstimator> {
        Ok(match self {
            TreeEstimator::DecisionTree(params) => FittedTreeEstimator::Tree(
                DecisionTree::fit_classifier(x, y, None, params, rng)?,
            ),
            TreeEstimator::RandomForest(params) => {
                FittedTreeEstimator::Forest(Forest::fit(x, y, params, false, rng)?)
            }
            TreeEstimator::ExtraTrees(params) => {
                FittedTreeEstimator::Forest(Forest::fit(x, y, params, true, rng)?)
            }
            TreeEstimator::GradientBoosting(params) => {
                FittedTreeEstimator::Boosted(GradientBoostedTrees::fit(x, y, params, rng)?)
            }
            TreeEstimator::AdaBoost(params) => {
                FittedTreeEstimator::Ada(AdaBoost::fit(x, y, params, rng)?)
            }
        })
    }
}

pub enum FittedTreeEstimator {
    Tree(DecisionTree),
    Forest(Forest),
    Boosted(GradientBoostedTrees),
    Ada(AdaBoost),
}

impl Classifier for FittedTreeEstimator {
    fn predict_proba(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        match self {
            FittedTreeEstimator::Tree(m) => {
                Array1::from_iter((0..x.nrows()).map(|row| m.predict_value(&x.row(row))))
            }
            FittedTreeEstimator::Forest(m) => m.predict_proba(x),
            FittedTreeEstimator::Boosted(m) => m.predict_proba(x),
            FittedTreeEstimator::Ada(m) => m.predict_proba(x),
        }
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        match self {
            FittedTreeEstimator::Tree(m) => m.feature_importances(),
            FittedTreeEstimator::Forest(m) => m.feature_importances(),
            FittedTreeEstimator::Boosted(m) => m.feature_importances(),
            FittedTreeEstimator::Ada(m) => m.feature_importances(),
        }
    }
}

/// Selection of the second stage of the meta pipeline.
#[derive(Debug, Clone)]
pub enum MetaLearner {
    /// Logistic regression on the one-hot leaf features.
    Maxent(LogisticParams),
    Mlp(MlpParams),
}

impl MetaLearner {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "maxent" => Ok(MetaLearner::Maxent(LogisticParams::default())),
            "mlp" => Ok(MetaLearner::Mlp(MlpParams::default())),
            other => Err(Error::Estimator(format!(
                "unknown meta-learner '{other}' (expected maxent or mlp)"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MetaLearner::Maxent(_) => "maxent",
            MetaLearner::Mlp(_) => "mlp",
        }
    }
}

enum FittedMetaLearner {
    Maxent(LogisticRegression),
    Mlp(MlpClassifier),
}

/// One-hot encoder over the dense leaf slots of a boosted-tree model.
struct LeafEncoder {
    /// Column offset of each tree's leaf block.
    offsets: Vec<usize>,
    width: usize,
}

impl LeafEncoder {
    fn new(leaf_counts: &[usize]) -> Self {
        let mut offsets = Vec::with_capacity(leaf_counts.len());
        let mut width = 0;
        for &count in leaf_counts {
            offsets.push(width);
            width += count;
        }
        LeafEncoder { offsets, width }
    }

    fn encode(&self, slots: &Array2<usize>) -> Array2<f64> {
        let mut features = Array2::zeros((slots.nrows(), self.width));
        for row in 0..slots.nrows() {
            for (tree, &offset) in self.offsets.iter().enumerate() {
                features[[row, offset + slots[[row, tree]]]] = 1.0;
            }
        }
        features
    }
}

/// The two-stage meta pipeline: a gradient-boosted transformer maps records
/// to per-tree leaf slots, a one-hot encoder sparsifies them, and the
/// meta-learner is fitted on the encoded features.
pub struct MetaPipeline {
    transformer: GradientBoostedTrees,
    encoder: LeafEncoder,
    meta: FittedMetaLearner,
}

impl MetaPipeline {
    pub fn fit(
        transform: &GbtParams,
        meta: &MetaLearner,
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        let transformer = GradientBoostedTrees::fit(x, y, transform, rng)?;
        let encoder = LeafEncoder::new(&transformer.leaf_counts());
        let features = encoder.encode(&transformer.apply(x));
        let meta = match meta {
            MetaLearner::Maxent(params) => FittedMetaLearner::Maxent(
                LogisticRegression::fit(&features.view(), y, params)?,
            ),
            MetaLearner::Mlp(params) => FittedMetaLearner::Mlp(MlpClassifier::fit(
                &features.view(),
                y,
                params,
                rng,
            )?),
        };
        Ok(MetaPipeline {
            transformer,
            encoder,
            meta,
        })
    }
}

impl Classifier for MetaPipeline {
    fn predict_proba(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        let features = self.encoder.encode(&self.transformer.apply(x));
        match &self.meta {
            FittedMetaLearner::Maxent(m) => m.predict_proba(&features.view()),
            FittedMetaLearner::Mlp(m) => m.predict_proba(&features.view()),
        }
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        // Importances are attributed by the transformer stage, which is the
        // only stage that sees the original predictors.
        self.transformer.feature_importances()
    }
}
