//! L2-regularised logistic regression ("Maxent"), the default
//! meta-estimator fitted on one-hot boosted-leaf features.
//!
//! Full-batch gradient descent; the indicator feature space it is fitted
//! on is already bounded, so no internal feature scaling is applied.

use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct LogisticParams {
    pub max_iterations: usize,
    pub learning_rate: f64,
    pub l2: f64,
    /// Stop when the gradient norm drops below this.
    pub tolerance: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        LogisticParams {
            max_iterations: 500,
            learning_rate: 0.5,
            l2: 1e-4,
            tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogisticRegression {
    weights: Array1<f64>,
    bias: f64,
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl LogisticRegression {
    pub fn fit(
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        params: &LogisticParams,
    ) -> Result<Self> {
        let n = x.nrows();
        if n == 0 {
            return Err(Error::Estimator(
                "cannot fit logistic regression on zero records".into(),
            ));
        }
        if y.len() != n {
            return Err(Error::Estimator(format!(
                "{} targets for {} records",
                y.len(),
                n
            )));
        }
        let mut weights = Array1::zeros(x.ncols());
        let mut bias = 0.0;
        let scale = 1.0 / n as f64;

        for _ in 0..params.max_iterations {
            let scores = x.dot(&weights) + bias;
            let errors: Array1<f64> = scores.mapv(sigmoid) - y;
            let mut grad_w = x.t().dot(&errors) * scale;
            grad_w.scaled_add(params.l2, &weights);
            let grad_b = errors.sum() * scale;

            let norm = grad_w.dot(&grad_w) + grad_b * grad_b;
            weights.scaled_add(-params.learning_rate, &grad_w);
            bias -= params.learning_rate * grad_b;
            if norm.sqrt() < params.tolerance {
                break;
            }
        }
        Ok(LogisticRegression { weights, bias })
    }

    pub fn predict_proba(&self, x: &ArrayView2<f64>) -> Array1<f64> {
        (x.dot(&self.weights) + self.bias).mapv(sigmoid)
    }

    pub fn coefficients(&self) -> (&Array1<f64>, f64) {
        (&self.weights, self.bias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn indicator_features_are_separated() {
        // Two one-hot features, each perfectly tied to a class.
        let x = array![
            [1.0, 0.0],
            [1.0, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [0.0, 1.0],
            [0.0, 1.0]
        ];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let model = LogisticRegression::fit(&x.view(), &y.view(), &LogisticParams::default())
            .unwrap();
        let probs = model.predict_proba(&x.view());
        assert!(probs[0] < 0.2, "p = {}", probs[0]);
        assert!(probs[5] > 0.8, "p = {}", probs[5]);
    }

    #[test]
    fn empty_input_is_rejected() {
        let x = ndarray::Array2::<f64>::zeros((0, 3));
        let y = ndarray::Array1::<f64>::zeros(0);
        assert!(
            LogisticRegression::fit(&x.view(), &y.view(), &LogisticParams::default()).is_err()
        );
    }
}
