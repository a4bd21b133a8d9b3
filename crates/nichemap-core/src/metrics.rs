//! Accuracy metrics, ROC handling, and the CSV score reports.
//!
//! Probability metrics are computed from held-out class probabilities;
//! binary metrics from thresholded labels via the 2x2 confusion table.
//! `binary_accuracy_scores` is the one deliberately degraded path: once its
//! inputs validate, an internally degenerate result becomes an all-zero
//! score vector instead of aborting a replicate loop.

use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{Error, Result};

/// Number of points every resampled ROC curve is interpolated onto.
pub const ROC_POINTS: usize = 101;

/// Metric names reported by [`binary_accuracy_scores`], in output order.
pub const BINARY_METRIC_NAMES: [&str; 16] = [
    "Prevalence",
    "Overall Diagnostic Power",
    "Correct Classification Rate",
    "Misclassification Rate",
    "Accuracy",
    "Sensitivity",
    "Specificity",
    "Positive Predictive Power",
    "Negative Predictive Power",
    "Precision",
    "Recall",
    "F1 Score",
    "Matthews Correlation",
    "Cohen's Kappa",
    "Normalized Mutual Information",
    "True Skill Statistic",
];

/// Metric names reported by [`probability_accuracy_scores`].
pub const PROBABILITY_METRIC_NAMES: [&str; 5] = [
    "AUC",
    "Point-Biserial r",
    "Average Precision",
    "Brier Score",
    "Log Loss",
];

fn check_binary(values: &[f64], what: &str) -> Result<()> {
    if values.iter().any(|&v| v != 0.0 && v != 1.0) {
        return Err(Error::data(format!("{what} contains values other than 0 and 1")));
    }
    Ok(())
}

fn check_lengths(a: usize, b: usize) -> Result<()> {
    if a != b {
        return Err(Error::data(format!("{a} true labels against {b} predictions")));
    }
    Ok(())
}

/// ROC points (fpr, tpr) for descending probability thresholds, anchored at
/// (0, 0) and (1, 1). Requires both classes to be present.
pub fn roc_curve(y_true: &[f64], probs: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
    check_lengths(y_true.len(), probs.len())?;
    check_binary(y_true, "true labels")?;
    let positives = y_true.iter().filter(|&&v| v == 1.0).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(Error::data("ROC needs both classes in the true labels"));
    }
    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].partial_cmp(&probs[a]).expect("finite probabilities"));

    let mut fpr = vec![0.0];
    let mut tpr = vec![0.0];
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut index = 0;
    while index < order.len() {
        // Step over ties as one threshold.
        let threshold = probs[order[index]];
        while index < order.len() && probs[order[index]] == threshold {
            if y_true[order[index]] == 1.0 {
                tp += 1;
            } else {
                fp += 1;
            }
            index += 1;
        }
        fpr.push(fp as f64 / negatives as f64);
        tpr.push(tp as f64 / positives as f64);
    }
    Ok((fpr, tpr))
}

/// Linearly resample a monotone ROC polyline onto the fixed
/// [`ROC_POINTS`]-element false-positive-rate grid spanning [0, 1], so
/// curves from different replicates can be averaged pointwise.
pub fn resample_roc(fpr: &[f64], tpr: &[f64]) -> Result<(Array1<f64>, Array1<f64>)> {
    check_lengths(fpr.len(), tpr.len())?;
    if fpr.len() < 2 {
        return Err(Error::data("ROC resampling needs at least two points"));
    }
    let grid = Array1::linspace(0.0, 1.0, ROC_POINTS);
    let resampled = grid.mapv(|g| interp(g, fpr, tpr));
    Ok((grid, resampled))
}

/// Piecewise-linear interpolation clamped to the endpoints, over an
/// x-vector sorted ascending.
fn interp(x: f64, xs: &[f64], ys: &[f64]) -> f64 {
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[xs.len() - 1] {
        return ys[ys.len() - 1];
    }
    let mut hi = 1;
    while xs[hi] < x {
        hi += 1;
    }
    let lo = hi - 1;
    if xs[hi] == xs[lo] {
        return ys[hi];
    }
    let t = (x - xs[lo]) / (xs[hi] - xs[lo]);
    ys[lo] + t * (ys[hi] - ys[lo])
}

/// Pearson correlation; zero when either side has no variance.
pub fn pearson_r(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    if n < 2.0 {
        return 0.0;
    }
    let mx = x.iter().sum::<f64>() / n;
    let my = y.iter().sum::<f64>() / n;
    let num: f64 = x.iter().zip(y).map(|(&a, &b)| (a - mx) * (b - my)).sum();
    let vx = x.iter().map(|&a| (a - mx).powi(2)).sum::<f64>().sqrt();
    let vy = y.iter().map(|&b| (b - my).powi(2)).sum::<f64>().sqrt();
    if vx < 1e-12 || vy < 1e-12 {
        return 0.0;
    }
    (num / (vx * vy)).clamp(-1.0, 1.0)
}

/// Probability-based scores over held-out predictions: AUC, point-biserial
/// correlation, average precision, Brier score, and log-loss.
pub fn probability_accuracy_scores(
    y_true: &[f64],
    probs: &[f64],
) -> Result<Vec<(&'static str, f64)>> {
    check_lengths(y_true.len(), probs.len())?;
    check_binary(y_true, "true labels")?;
    let (fpr, tpr) = roc_curve(y_true, probs)?;
    let auc = trapezoid(&fpr, &tpr);
    let r = pearson_r(probs, y_true);

    // Average precision: precision at each positive hit in descending
    // probability order.
    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].partial_cmp(&probs[a]).expect("finite probabilities"));
    let positives = y_true.iter().filter(|&&v| v == 1.0).count();
    let mut tp = 0usize;
    let mut ap = 0.0;
    for (rank, &row) in order.iter().enumerate() {
        if y_true[row] == 1.0 {
            tp += 1;
            ap += tp as f64 / (rank + 1) as f64;
        }
    }
    let ap = ap / positives as f64;

    let n = y_true.len() as f64;
    let brier = y_true
        .iter()
        .zip(probs)
        .map(|(&t, &p)| (p - t).powi(2))
        .sum::<f64>()
        / n;
    let log_loss = y_true
        .iter()
        .zip(probs)
        .map(|(&t, &p)| {
            let p = p.clamp(1e-15, 1.0 - 1e-15);
            -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
        })
        .sum::<f64>()
        / n;

    Ok(PROBABILITY_METRIC_NAMES
        .into_iter()
        .zip([auc, r, ap, brier, log_loss])
        .collect())
}

fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum()
}

/// The sixteen binary classification scores.
///
/// Non-binary or length-mismatched inputs are an error. After validation
/// the function never fails: a degenerate confusion table (which would
/// otherwise produce non-finite ratios) degrades to an all-zero vector so
/// a replicate loop can keep going.
pub fn binary_accuracy_scores(
    y_true: &[f64],
    y_pred: &[f64],
) -> Result<Vec<(&'static str, f64)>> {
    check_lengths(y_true.len(), y_pred.len())?;
    check_binary(y_true, "true labels")?;
    check_binary(y_pred, "predicted labels")?;
    if y_true.is_empty() {
        return Err(Error::data("no records to score"));
    }

    let mut tp = 0.0;
    let mut tn = 0.0;
    let mut fp = 0.0;
    let mut fn_ = 0.0;
    for (&t, &p) in y_true.iter().zip(y_pred) {
        match (t == 1.0, p == 1.0) {
            (true, true) => tp += 1.0,
            (false, false) => tn += 1.0,
            (false, true) => fp += 1.0,
            (true, false) => fn_ += 1.0,
        }
    }
    let n = y_true.len() as f64;

    let prevalence = (tp + fn_) / n;
    let odp = (fp + tn) / n;
    let ccr = (tp + tn) / n;
    let mr = (fp + fn_) / n;
    let sensitivity = tp / (tp + fn_);
    let specificity = tn / (tn + fp);
    let ppp = tp / (tp + fp);
    let npp = tn / (tn + fn_);
    let f1 = 2.0 * tp / (2.0 * tp + fp + fn_);
    let mcc = (tp * tn - fp * fn_)
        / ((tp + fp) * (tp + fn_) * (tn + fp) * (tn + fn_)).sqrt();
    let pe = ((tp + fp) * (tp + fn_) + (tn + fn_) * (tn + fp)) / (n * n);
    let kappa = (ccr - pe) / (1.0 - pe);
    let nmi = normalized_mutual_information(tp, fp, fn_, tn, n);
    let tss = sensitivity + specificity - 1.0;

    let values = [
        prevalence,
        odp,
        ccr,
        mr,
        ccr,
        sensitivity,
        specificity,
        ppp,
        npp,
        ppp,
        sensitivity,
        f1,
        mcc,
        kappa,
        nmi,
        tss,
    ];
    let values: Vec<f64> = if values.iter().all(|v| v.is_finite()) {
        values.to_vec()
    } else {
        vec![0.0; BINARY_METRIC_NAMES.len()]
    };
    Ok(BINARY_METRIC_NAMES.into_iter().zip(values).collect())
}

fn normalized_mutual_information(tp: f64, fp: f64, fn_: f64, tn: f64, n: f64) -> f64 {
    let joint = [tp / n, fn_ / n, fp / n, tn / n];
    let truth = [(tp + fn_) / n, (fp + tn) / n];
    let pred = [(tp + fp) / n, (fn_ + tn) / n];

    let entropy = |p: &[f64]| -> f64 {
        -p.iter().filter(|&&v| v > 0.0).map(|&v| v * v.ln()).sum::<f64>()
    };
    let mut mi = 0.0;
    for (index, &pij) in joint.iter().enumerate() {
        if pij > 0.0 {
            let pt = truth[index / 2];
            let pp = pred[index % 2];
            mi += pij * (pij / (pt * pp)).ln();
        }
    }
    let denom = (entropy(&truth) + entropy(&pred)) / 2.0;
    if denom <= 0.0 {
        0.0
    } else {
        (mi / denom).clamp(0.0, 1.0)
    }
}

/// Reliability curve: bin predictions into `bins` equal-width probability
/// bins and return (mean predicted, observed positive fraction) per
/// non-empty bin.
pub fn calibration_curve(
    y_true: &[f64],
    probs: &[f64],
    bins: usize,
) -> Result<(Vec<f64>, Vec<f64>)> {
    check_lengths(y_true.len(), probs.len())?;
    check_binary(y_true, "true labels")?;
    if bins == 0 {
        return Err(Error::data("calibration needs at least one bin"));
    }
    let mut sum_p = vec![0.0; bins];
    let mut sum_t = vec![0.0; bins];
    let mut count = vec![0usize; bins];
    for (&t, &p) in y_true.iter().zip(probs) {
        let bin = ((p * bins as f64) as usize).min(bins - 1);
        sum_p[bin] += p;
        sum_t[bin] += t;
        count[bin] += 1;
    }
    let mut mean_pred = Vec::new();
    let mut observed = Vec::new();
    for bin in 0..bins {
        if count[bin] > 0 {
            mean_pred.push(sum_p[bin] / count[bin] as f64);
            observed.push(sum_t[bin] / count[bin] as f64);
        }
    }
    Ok((mean_pred, observed))
}

/// Append (metric, score) rows to a CSV report, writing the header only
/// when the file does not exist yet; repeated calls accumulate one report
/// across a pipeline run.
pub fn append_scores(path: &Path, scores: &[(&str, f64)]) -> Result<()> {
    let new_file = !path.exists();
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let mut writer = csv::Writer::from_writer(file);
    if new_file {
        writer.write_record(["Metric", "Score"])?;
    }
    for (name, score) in scores {
        writer.write_record([name.to_string(), score.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Variance inflation factors of the continuous predictors, one one-vs-rest
/// OLS fit per column, written as a two-column CSV.
pub fn export_vif(path: &Path, names: &[&str], x: &ArrayView2<f64>) -> Result<()> {
    if names.len() != x.ncols() {
        return Err(Error::data(format!(
            "{} names for {} predictor columns",
            names.len(),
            x.ncols()
        )));
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Predictor", "VIF"])?;
    for (column, name) in names.iter().enumerate() {
        let vif = variance_inflation(x, column);
        writer.write_record([name.to_string(), vif.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

fn variance_inflation(x: &ArrayView2<f64>, column: usize) -> f64 {
    let y = x.column(column);
    let others: Vec<usize> = (0..x.ncols()).filter(|&c| c != column).collect();
    if others.is_empty() {
        return 1.0;
    }
    // Design matrix with an intercept column.
    let mut design = Array2::ones((x.nrows(), others.len() + 1));
    for (slot, &other) in others.iter().enumerate() {
        design.column_mut(slot + 1).assign(&x.column(other));
    }
    let r2 = ols_r_squared(&design.view(), &y);
    if (1.0 - r2) < 1e-12 {
        f64::INFINITY
    } else {
        1.0 / (1.0 - r2)
    }
}

/// R² of an ordinary least-squares fit, via the normal equations.
fn ols_r_squared(design: &ArrayView2<f64>, y: &ArrayView1<f64>) -> f64 {
    let ata = design.t().dot(design);
    let atb = design.t().dot(y);
    let Some(coefficients) = solve(ata, atb) else {
        // Singular system: the column is perfectly collinear.
        return 1.0;
    };
    let fitted = design.dot(&coefficients);
    let mean = y.sum() / y.len() as f64;
    let sst: f64 = y.iter().map(|&v| (v - mean).powi(2)).sum();
    if sst < 1e-12 {
        return 0.0;
    }
    let sse: f64 = y
        .iter()
        .zip(fitted.iter())
        .map(|(&obs, &fit)| (obs - fit).powi(2))
        .sum();
    (1.0 - sse / sst).clamp(0.0, 1.0)
}

/// Solve a small dense symmetric system by Gaussian elimination with
/// partial pivoting; `None` when the system is singular.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    for pivot in 0..n {
        let mut best = pivot;
        for row in pivot + 1..n {
            if a[[row, pivot]].abs() > a[[best, pivot]].abs() {
                best = row;
            }
        }
        if a[[best, pivot]].abs() < 1e-12 {
            return None;
        }
        if best != pivot {
            for col in 0..n {
                let tmp = a[[pivot, col]];
                a[[pivot, col]] = a[[best, col]];
                a[[best, col]] = tmp;
            }
            b.swap(pivot, best);
        }
        for row in pivot + 1..n {
            let factor = a[[row, pivot]] / a[[pivot, pivot]];
            for col in pivot..n {
                a[[row, col]] -= factor * a[[pivot, col]];
            }
            b[row] -= factor * b[pivot];
        }
    }
    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let mut sum = b[row];
        for col in row + 1..n {
            sum -= a[[row, col]] * x[col];
        }
        x[row] = sum / a[[row, row]];
    }
    Some(x)
}

/// Pearson correlation matrix of the named predictor columns, written as a
/// CSV with row and column headers.
pub fn export_correlation_matrix(
    path: &Path,
    names: &[&str],
    x: &ArrayView2<f64>,
) -> Result<()> {
    if names.len() != x.ncols() {
        return Err(Error::data(format!(
            "{} names for {} predictor columns",
            names.len(),
            x.ncols()
        )));
    }
    let columns: Vec<Vec<f64>> = (0..x.ncols())
        .map(|c| x.index_axis(Axis(1), c).to_vec())
        .collect();
    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["".to_string()];
    header.extend(names.iter().map(|s| s.to_string()));
    writer.write_record(&header)?;
    for (row, name) in names.iter().enumerate() {
        let mut record = vec![name.to_string()];
        for col in 0..names.len() {
            record.push(pearson_r(&columns[row], &columns[col]).to_string());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn resampled_roc_has_fixed_grid() {
        let fpr = [0.0, 0.2, 0.7, 1.0];
        let tpr = [0.0, 0.6, 0.9, 1.0];
        let (grid, curve) = resample_roc(&fpr, &tpr).unwrap();
        assert_eq!(grid.len(), ROC_POINTS);
        assert_eq!(curve.len(), ROC_POINTS);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[ROC_POINTS - 1], 1.0);
        assert_eq!(curve[0], 0.0);
        assert_eq!(curve[ROC_POINTS - 1], 1.0);
        // Interior points interpolate the polyline.
        assert_abs_diff_eq!(curve[10], 0.3, epsilon = 1e-9);
    }

    #[test]
    fn perfect_predictions_score_one() {
        let y = [0.0, 1.0, 0.0, 1.0];
        let scores = binary_accuracy_scores(&y, &y).unwrap();
        let get = |name: &str| {
            scores
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| *v)
                .unwrap()
        };
        assert_eq!(get("Correct Classification Rate"), 1.0);
        assert_eq!(get("Accuracy"), 1.0);
        assert_eq!(get("Sensitivity"), 1.0);
        assert_eq!(get("Specificity"), 1.0);
        assert_eq!(get("Misclassification Rate"), 0.0);
        assert_eq!(get("Prevalence"), 0.5);
        assert_eq!(get("True Skill Statistic"), 1.0);
        assert_abs_diff_eq!(get("Normalized Mutual Information"), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn degenerate_confusion_degrades_to_zeros() {
        // All-negative truth and prediction: sensitivity is 0/0.
        let y = [0.0, 0.0, 0.0];
        let scores = binary_accuracy_scores(&y, &y).unwrap();
        assert_eq!(scores.len(), BINARY_METRIC_NAMES.len());
        assert!(scores.iter().all(|(_, v)| *v == 0.0));
    }

    #[test]
    fn invalid_labels_are_an_error() {
        assert!(binary_accuracy_scores(&[0.0, 2.0], &[0.0, 1.0]).is_err());
        assert!(binary_accuracy_scores(&[0.0, 1.0], &[0.0]).is_err());
    }

    #[test]
    fn auc_of_a_perfect_ranker_is_one() {
        let y = [0.0, 0.0, 1.0, 1.0];
        let p = [0.1, 0.2, 0.8, 0.9];
        let scores = probability_accuracy_scores(&y, &p).unwrap();
        assert_abs_diff_eq!(scores[0].1, 1.0, epsilon = 1e-9);
        // Brier score of confident correct predictions is small.
        assert!(scores[3].1 < 0.05);
    }

    #[test]
    fn scores_csv_accumulates_without_duplicate_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Accuracy_Stats.csv");
        append_scores(&path, &[("AUC", 0.9)]).unwrap();
        append_scores(&path, &[("AUC", 0.8)]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Metric,Score");
    }

    #[test]
    fn vif_flags_a_collinear_predictor() {
        let n = 50;
        let mut x = Array2::zeros((n, 3));
        for row in 0..n {
            let a = row as f64 * 0.1;
            let b = ((row * 7) % 13) as f64;
            x[[row, 0]] = a;
            x[[row, 1]] = b;
            x[[row, 2]] = 2.0 * a + 1.0; // exact linear function of column 0
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("VIF_Scores.csv");
        export_vif(&path, &["a", "b", "c"], &x.view()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let vif_c: f64 = text
            .lines()
            .find(|l| l.starts_with("c,"))
            .and_then(|l| l.split(',').nth(1))
            .unwrap()
            .parse()
            .unwrap();
        assert!(vif_c > 100.0 || vif_c.is_infinite());
    }

    #[test]
    fn correlation_matrix_is_symmetric_with_unit_diagonal() {
        let x = ndarray::array![[1.0, 2.0], [2.0, 4.1], [3.0, 5.9], [4.0, 8.2]];
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Pearson_Correlation_Matrix.csv");
        export_correlation_matrix(&path, &["a", "b"], &x.view()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), ",a,b");
        let row_a: Vec<&str> = lines.next().unwrap().split(',').collect();
        assert_eq!(row_a[1], "1");
        let r_ab: f64 = row_a[2].parse().unwrap();
        assert!(r_ab > 0.99);
    }

    #[test]
    fn calibration_bins_track_observed_rates() {
        let y = [0.0, 0.0, 1.0, 1.0, 1.0, 0.0];
        let p = [0.1, 0.15, 0.9, 0.85, 0.88, 0.12];
        let (mean_pred, observed) = calibration_curve(&y, &p, 5).unwrap();
        assert_eq!(mean_pred.len(), 2);
        assert_eq!(observed[0], 0.0);
        assert_eq!(observed[1], 1.0);
    }
}
