//! A single-hidden-layer perceptron, the alternative meta-estimator.
//!
//! tanh hidden units, a sigmoid output, full-batch gradient descent on
//! log-loss. Deliberately small: it exists to back the `MetaLearner::Mlp`
//! variant, not to be a general network library.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct MlpParams {
    pub hidden_units: usize,
    pub max_iterations: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

impl Default for MlpParams {
    fn default() -> Self {
        MlpParams {
            hidden_units: 16,
            max_iterations: 400,
            learning_rate: 0.05,
            l2: 1e-4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MlpClassifier {
    /// (features, hidden)
    w1: Array2<f64>,
    b1: Array1<f64>,
    /// (hidden)
    w2: Array1<f64>,
    b2: f64,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl MlpClassifier {
    pub fn fit(
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        params: &MlpParams,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        let n = x.nrows();
        if n == 0 {
            return Err(Error::Estimator("cannot fit an MLP on zero records".into()));
        }
        if params.hidden_units == 0 {
            return Err(Error::Estimator("MLP needs at least one hidden unit".into()));
        }
        let features = x.ncols();
        let init = (1.0 / features.max(1) as f64).sqrt();
        let mut w1 = Array2::from_shape_fn((features, params.hidden_units), |_| {
            rng.gen_range(-init..init)
        });
        let mut b1 = Array1::zeros(params.hidden_units);
        let mut w2 = Array1::from_shape_fn(params.hidden_units, |_| rng.gen_range(-init..init));
        let mut b2 = 0.0;
        let scale = 1.0 / n as f64;

        for _ in 0..params.max_iterations {
            // Forward pass.
            let hidden = (x.dot(&w1) + &b1).mapv(f64::tanh);
            let output = (hidden.dot(&w2) + b2).mapv(sigmoid);

            // Backward pass.
            let delta_out: Array1<f64> = output - y;
            let grad_w2 = hidden.t().dot(&delta_out) * scale + &(params.l2 * &w2);
            let grad_b2 = delta_out.sum() * scale;

            let mut delta_hidden = Array2::zeros(hidden.raw_dim());
            for row in 0..n {
                for unit in 0..params.hidden_units {
                    let h = hidden[[row, unit]];
                    delta_hidden[[row, unit]] = delta_out[row] * w2[unit] * (1.0 - h * h);
                }
            }
            let grad_w1 = x.t().dot(&delta_hidden) * scale + &(params.l2 * &w1);
            let grad_b1 = delta_hidden.sum_axis(Axis(0)) * scale;

            w1.scaled_add(-params.learning_rate, &grad_w1);
            b1.scaled_add(-params.learning_rate, &grad_b1);
            w2.scaled_add(-params.learning_rate, &grad_w2);
            b2 -= params.learning_rate * grad_b2;
        }
        Ok(MlpClassifier { w1, b1, w2, b2 })
    }

    pub fn predict_proba(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        let hidden = (x.dot(&self.w1) + &self.b1).mapv(f64::tanh);
        (hidden.dot(&self.w2) + self.b2).mapv(sigmoid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn learns_an_indicator_mapping() {
        let x = array![
            [1.0, 0.0],
            [1.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [0.0, 1.0],
            [0.0, 1.0]
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut rng = StdRng::seed_from_u64(21);
        let model =
            MlpClassifier::fit(&x.view(), &y.view(), &MlpParams::default(), &mut rng).unwrap();
        let probs = model.predict_proba(&x.view());
        assert!(probs[0] < 0.5, "p = {}", probs[0]);
        assert!(probs[5] > 0.5, "p = {}", probs[5]);
    }

    #[test]
    fn zero_hidden_units_is_rejected() {
        let x = array![[0.0], [1.0]];
        let y = array![0.0, 1.0];
        let params = MlpParams {
            hidden_units: 0,
            ..MlpParams::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        assert!(MlpClassifier::fit(&x.view(), &y.view(), &params, &mut rng).is_err());
    }
}
