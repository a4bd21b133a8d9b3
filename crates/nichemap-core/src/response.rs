//! Response-curve probing: synthetic "Lek" input matrices that vary one
//! predictor while holding the rest at central values, and the aggregation
//! of the per-replicate probabilities predicted on them.

use ndarray::{Array1, Array2};

use crate::config::SimulationConfig;
use crate::error::{Error, Result};
use crate::table::{SampleTable, LABEL_COLUMN};

/// Percentile range probed for a continuous predictor: 1st..=99th.
pub const PERCENTILE_STEPS: usize = 99;

#[derive(Debug, Clone)]
pub enum ResponseAxis {
    /// Probed percentile values of the predictor.
    Continuous(Vec<f64>),
    /// Observed classes of the predictor.
    Categorical(Vec<f64>),
}

/// Synthetic input rows probing one predictor's marginal response.
/// Column layout matches the predictor matrix fed to the estimator.
#[derive(Debug, Clone)]
pub struct LekMatrix {
    pub predictor: String,
    pub axis: ResponseAxis,
    pub matrix: Array2<f64>,
}

/// Build one Lek matrix per predictor from the training table.
///
/// Continuous predictors are swept over their 1st..=99th percentiles with
/// every other continuous column held at its mean and categorical columns
/// at their modal class; categorical predictors get one row per observed
/// class. At least one continuous predictor must exist.
pub fn create_lek_matrices(
    table: &SampleTable,
    config: &SimulationConfig,
) -> Result<Vec<LekMatrix>> {
    let categorical = config.categorical_names();
    let predictors: Vec<(usize, &String)> = table
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| name.as_str() != LABEL_COLUMN)
        .collect();
    if predictors
        .iter()
        .all(|(_, name)| categorical.contains(&name.as_str()))
    {
        return Err(Error::data(
            "response curves need at least one continuous predictor",
        ));
    }

    // Central value per predictor column: mean for continuous columns,
    // modal class for categorical ones.
    let centres: Vec<f64> = predictors
        .iter()
        .map(|&(index, name)| {
            let values = table.data().column(index);
            if categorical.contains(&name.as_str()) {
                mode(&values.to_vec())
            } else {
                values.sum() / values.len() as f64
            }
        })
        .collect();

    let mut matrices = Vec::with_capacity(predictors.len());
    for (slot, &(index, name)) in predictors.iter().enumerate() {
        let values = table.data().column(index).to_vec();
        let (axis, probes) = if categorical.contains(&name.as_str()) {
            let mut classes = values.clone();
            classes.sort_by(|a, b| a.partial_cmp(b).expect("finite class codes"));
            classes.dedup();
            (ResponseAxis::Categorical(classes.clone()), classes)
        } else {
            let probes: Vec<f64> =
                (1..=PERCENTILE_STEPS).map(|p| percentile(&values, p as f64)).collect();
            (ResponseAxis::Continuous(probes.clone()), probes)
        };
        let mut matrix = Array2::zeros((probes.len(), predictors.len()));
        for (row, &probe) in probes.iter().enumerate() {
            for (column, &centre) in centres.iter().enumerate() {
                matrix[[row, column]] = if column == slot { probe } else { centre };
            }
        }
        matrices.push(LekMatrix {
            predictor: name.clone(),
            axis,
            matrix,
        });
    }
    Ok(matrices)
}

/// Linear-interpolated percentile of an unsorted sample.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite values"));
    let rank = (p / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (rank - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

fn mode(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite values"));
    let mut best = sorted[0];
    let mut best_run = 0usize;
    let mut run_value = sorted[0];
    let mut run = 0usize;
    for &v in &sorted {
        if v == run_value {
            run += 1;
        } else {
            run_value = v;
            run = 1;
        }
        if run > best_run {
            best_run = run;
            best = run_value;
        }
    }
    best
}

/// Elementwise mean and standard deviation of per-replicate response
/// probabilities. The replicate count is validated against expectation.
pub fn mean_responses(
    per_replicate: &[Array1<f64>],
    expected_replicates: usize,
) -> Result<(Array1<f64>, Array1<f64>)> {
    if per_replicate.len() != expected_replicates {
        return Err(Error::data(format!(
            "{} response vectors for {} replicates",
            per_replicate.len(),
            expected_replicates
        )));
    }
    let length = per_replicate[0].len();
    if per_replicate.iter().any(|r| r.len() != length) {
        return Err(Error::data("response vectors differ in length"));
    }
    let n = per_replicate.len() as f64;
    let mut mean = Array1::zeros(length);
    for replicate in per_replicate {
        mean += replicate;
    }
    mean /= n;
    let mut variance = Array1::<f64>::zeros(length);
    for replicate in per_replicate {
        let diff = replicate - &mean;
        variance += &(&diff * &diff);
    }
    variance /= n;
    Ok((mean, variance.mapv(f64::sqrt)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::path::PathBuf;

    fn config(names: &[&str], categorical: &[bool]) -> SimulationConfig {
        SimulationConfig {
            output_dir: PathBuf::new(),
            predictors: names.iter().map(|n| PathBuf::from(format!("{n}.tif"))).collect(),
            categorical: categorical.to_vec(),
            predictor_names: names.iter().map(|s| s.to_string()).collect(),
            no_data: 0.0,
            mask: PathBuf::from("mask.tif"),
            geo_transform: [0.0, 1.0, 0.0, 10.0, 0.0, -1.0],
            projection: String::new(),
            raster_width: 10,
            raster_height: 10,
        }
    }

    fn training_table() -> SampleTable {
        let mut data = ndarray::Array2::zeros((20, 2));
        for row in 0..20 {
            data[[row, 0]] = row as f64;
            data[[row, 1]] = if row < 15 { 1.0 } else { 3.0 };
        }
        SampleTable::new(vec!["elev".into(), "soil".into()], data).unwrap()
    }

    #[test]
    fn continuous_matrix_sweeps_percentiles() {
        let table = training_table();
        let config = config(&["elev", "soil"], &[false, true]);
        let matrices = create_lek_matrices(&table, &config).unwrap();
        assert_eq!(matrices.len(), 2);

        let elev = &matrices[0];
        assert_eq!(elev.matrix.nrows(), PERCENTILE_STEPS);
        // Every other column is pinned: soil stays at its modal class.
        assert!(elev.matrix.column(1).iter().all(|&v| v == 1.0));
        // Probe values ascend.
        let probes = elev.matrix.column(0);
        assert!(probes.windows(2).into_iter().all(|w| w[0] <= w[1]));
    }

    #[test]
    fn categorical_matrix_has_one_row_per_class() {
        let table = training_table();
        let config = config(&["elev", "soil"], &[false, true]);
        let matrices = create_lek_matrices(&table, &config).unwrap();
        let soil = &matrices[1];
        assert_eq!(soil.matrix.nrows(), 2);
        assert_eq!(soil.matrix.column(1).to_vec(), vec![1.0, 3.0]);
        // Continuous columns held at the dataset mean.
        assert!((soil.matrix[[0, 0]] - 9.5).abs() < 1e-9);
    }

    #[test]
    fn all_categorical_predictors_are_rejected() {
        let table = training_table();
        let config = config(&["elev", "soil"], &[true, true]);
        assert!(create_lek_matrices(&table, &config).is_err());
    }

    #[test]
    fn mean_responses_validates_replicate_count() {
        let runs = vec![array![0.2, 0.4], array![0.4, 0.6]];
        let (mean, std) = mean_responses(&runs, 2).unwrap();
        assert_eq!(mean, array![0.3, 0.5]);
        assert!((std[0] - 0.1).abs() < 1e-9);
        assert!(mean_responses(&runs, 3).is_err());
    }

    #[test]
    fn percentile_interpolates() {
        let values = vec![0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&values, 50.0), 2.0);
        assert_eq!(percentile(&values, 25.0), 1.0);
        assert!((percentile(&values, 10.0) - 0.4).abs() < 1e-9);
    }
}
