//! The replicate engine: repeated split/fit/score/export rounds and the
//! aggregation of everything they produce.
//!
//! Run order:
//!   1. validate the configuration, grid alignment, and sample table
//!   2. prepare the output directory and the Lek response matrices
//!   3. replicate loop: split, fit, score, probe responses, export raster
//!   4. aggregate metrics, importances, ROC/calibration and response curves
//!   5. summarise the replicate rasters into Mean/StDev/CV surfaces
//!
//! The two public entry points share this machinery and differ only in the
//! estimator they fit per replicate.

use std::fs;
use std::path::PathBuf;

use log::info;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::SimulationConfig;
use crate::error::{Error, Result};
use crate::estimator::{Classifier, GbtParams, MetaLearner, MetaPipeline, TreeEstimator};
use crate::metrics;
use crate::plot::{self, PlotStyle};
use crate::predict::{self, SummarySurfaces};
use crate::raster::{align, OutputFormat};
use crate::response::{self, LekMatrix, ResponseAxis};
use crate::table::{self, SampleTable, LABEL_COLUMN};

/// How each replicate partitions the sample table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Validation {
    SplitSample { test_fraction: f64 },
    Bootstrap,
    KFold { folds: usize },
}

impl Validation {
    /// Parse a CLI validation spec: `split-sample[:fraction]`, `bootstrap`,
    /// or `kfold[:folds]`.
    pub fn parse(spec: &str) -> Result<Self> {
        let (name, arg) = match spec.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (spec, None),
        };
        match name {
            "split-sample" => {
                let fraction = match arg {
                    Some(arg) => arg.parse::<f64>().map_err(|_| {
                        Error::config(format!("bad test fraction '{arg}'"))
                    })?,
                    None => table::DEFAULT_TEST_FRACTION,
                };
                Ok(Validation::SplitSample { test_fraction: fraction })
            }
            "bootstrap" => Ok(Validation::Bootstrap),
            "kfold" => {
                let folds = match arg {
                    Some(arg) => arg.parse::<usize>().map_err(|_| {
                        Error::config(format!("bad fold count '{arg}'"))
                    })?,
                    None => 10,
                };
                Ok(Validation::KFold { folds })
            }
            other => Err(Error::config(format!(
                "unknown validation mode '{other}' (expected split-sample, bootstrap, or kfold)"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Replicate count; under k-fold validation the fold count wins.
    pub replicates: usize,
    pub validation: Validation,
    pub seed: u64,
    pub format: OutputFormat,
    /// Predict rasters in one whole-image read instead of native blocks.
    pub whole_image: bool,
    /// Remove and recreate the output directory before running.
    pub overwrite: bool,
    pub style: PlotStyle,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            replicates: 10,
            validation: Validation::SplitSample {
                test_fraction: table::DEFAULT_TEST_FRACTION,
            },
            seed: 42,
            format: OutputFormat::GTiff,
            whole_image: false,
            overwrite: false,
            style: PlotStyle::default(),
        }
    }
}

/// Aggregated outcome of a simulation run.
pub struct SimulationSummary {
    pub replicates: usize,
    pub probability_scores: Vec<(&'static str, f64)>,
    pub binary_scores: Vec<(&'static str, f64)>,
    /// (predictor, mean importance, std) when the estimator reports them.
    pub importances: Option<Vec<(String, f64, f64)>>,
    pub replicate_rasters: Vec<PathBuf>,
    pub surfaces: SummarySurfaces,
}

/// Fit a single-stage tree-ensemble estimator per replicate.
pub fn run_tree_simulation(
    config: &SimulationConfig,
    table: &SampleTable,
    estimator: &TreeEstimator,
    options: &RunOptions,
) -> Result<SimulationSummary> {
    info!("running {} simulation", estimator.name());
    run_simulation(config, table, options, &|x: &ArrayView2<f64>, y: &ArrayView1<f64>, rng: &mut StdRng| {
        Ok(Box::new(estimator.fit(x, y, rng)?))
    })
}

/// Fit the boosted-transform meta pipeline per replicate.
pub fn run_meta_simulation(
    config: &SimulationConfig,
    table: &SampleTable,
    transform: &GbtParams,
    meta: &MetaLearner,
    options: &RunOptions,
) -> Result<SimulationSummary> {
    info!("running meta simulation ({})", meta.name());
    run_simulation(config, table, options, &|x: &ArrayView2<f64>, y: &ArrayView1<f64>, rng: &mut StdRng| {
        Ok(Box::new(MetaPipeline::fit(transform, meta, x, y, rng)?))
    })
}

type FitFn<'f> = &'f dyn Fn(
    &ArrayView2<f64>,
    &ArrayView1<f64>,
    &mut StdRng,
) -> Result<Box<dyn Classifier>>;

fn run_simulation(
    config: &SimulationConfig,
    table: &SampleTable,
    options: &RunOptions,
    fit: FitFn<'_>,
) -> Result<SimulationSummary> {
    // ── 1. Validate ─────────────────────────────────────────────────────
    config.validate()?;
    let misaligned = align::find_misaligned(&config.predictors, &config.mask)?;
    if !misaligned.is_empty() {
        return Err(Error::config(format!(
            "{} predictor raster(s) disagree with the mask grid: {:?}",
            misaligned.len(),
            misaligned
        )));
    }
    let (_, labels) = table::split_xy(table)?;
    if labels.iter().all(|&v| v == 0.0) || labels.iter().all(|&v| v == 1.0) {
        return Err(Error::data(
            "sample table holds a single class; both presences and absences are required",
        ));
    }
    let replicates = match options.validation {
        Validation::KFold { folds } => folds,
        _ => options.replicates,
    };
    if replicates == 0 {
        return Err(Error::config("at least one replicate is required"));
    }

    // ── 2. Prepare outputs and response probes ──────────────────────────
    if options.overwrite && config.output_dir.exists() {
        fs::remove_dir_all(&config.output_dir)?;
    }
    fs::create_dir_all(&config.output_dir)?;
    let lek_matrices = response::create_lek_matrices(table, config)?;
    let predictor_columns: Vec<String> = table
        .columns()
        .iter()
        .filter(|name| name.as_str() != LABEL_COLUMN)
        .cloned()
        .collect();

    let mut rng = StdRng::seed_from_u64(options.seed);
    let folds = match options.validation {
        Validation::KFold { folds } => Some(table::kfold_split(table, folds, &mut rng)?),
        _ => None,
    };

    // ── 3. Replicate loop ───────────────────────────────────────────────
    let mut all_true: Vec<f64> = Vec::new();
    let mut all_probs: Vec<f64> = Vec::new();
    let mut roc_curves: Vec<Array1<f64>> = Vec::new();
    let mut importance_runs: Vec<Array1<f64>> = Vec::new();
    let mut responses: Vec<Vec<Array1<f64>>> = vec![Vec::new(); lek_matrices.len()];
    let mut replicate_rasters = Vec::with_capacity(replicates);

    for replicate in 0..replicates {
        let (train, test) = match (&options.validation, &folds) {
            (Validation::SplitSample { test_fraction }, _) => {
                table::train_test_split(table, *test_fraction, &mut rng)
            }
            (Validation::Bootstrap, _) => table::bootstrap_split(table, &mut rng),
            (Validation::KFold { .. }, Some(folds)) => {
                let test = folds[replicate].clone();
                let rest: Vec<&SampleTable> = folds
                    .iter()
                    .enumerate()
                    .filter(|(index, _)| *index != replicate)
                    .map(|(_, fold)| fold)
                    .collect();
                (SampleTable::concat(&rest)?, test)
            }
            (Validation::KFold { .. }, None) => unreachable!("folds prepared above"),
        };

        let (x_train, y_train) = table::split_xy(&train)?;
        let (x_test, y_test) = table::split_xy(&test)?;
        let model = fit(&x_train.view(), &y_train.view(), &mut rng)?;

        let train_probs = model.predict_proba(&x_train.view());
        let train_accuracy = train_probs
            .iter()
            .zip(y_train.iter())
            .filter(|(&p, &t)| (p >= 0.5) == (t == 1.0))
            .count() as f64
            / y_train.len() as f64;
        if let Some(importance) = model.feature_importances() {
            importance_runs.push(importance);
        }

        let test_probs = model.predict_proba(&x_test.view());
        let (fpr, tpr) = metrics::roc_curve(&y_test.to_vec(), &test_probs.to_vec())?;
        let (_, resampled) = metrics::resample_roc(&fpr, &tpr)?;
        roc_curves.push(resampled);
        all_true.extend(y_test.iter());
        all_probs.extend(test_probs.iter());

        for (slot, lek) in lek_matrices.iter().enumerate() {
            responses[slot].push(model.predict_proba(&lek.matrix.view()));
        }

        let raster_path = config
            .output_dir
            .join(format!("Run_{replicate:03}.{}", options.format.extension()));
        predict::export_presence_image(
            model.as_ref(),
            config,
            &raster_path,
            options.format,
            options.whole_image,
        )?;
        replicate_rasters.push(raster_path);

        info!(
            "replicate {}/{} done (train accuracy {:.3})",
            replicate + 1,
            replicates,
            train_accuracy
        );
    }

    // ── 4. Aggregate ────────────────────────────────────────────────────
    let probability_scores = metrics::probability_accuracy_scores(&all_true, &all_probs)?;
    let predicted: Vec<f64> = all_probs
        .iter()
        .map(|&p| if p >= 0.5 { 1.0 } else { 0.0 })
        .collect();
    let binary_scores = metrics::binary_accuracy_scores(&all_true, &predicted)?;
    let stats_path = config.output_dir.join("Accuracy_Stats.csv");
    metrics::append_scores(&stats_path, &probability_scores)?;
    metrics::append_scores(&stats_path, &binary_scores)?;

    let importances = summarise_importances(
        &predictor_columns,
        &importance_runs,
        &config.output_dir.join("Variable_Importance_Scores.csv"),
    )?;

    export_collinearity_reports(config, table)?;

    let mut roc_mean = Array1::zeros(metrics::ROC_POINTS);
    for curve in &roc_curves {
        roc_mean += curve;
    }
    roc_mean /= roc_curves.len() as f64;
    let grid = Array1::linspace(0.0, 1.0, metrics::ROC_POINTS);
    plot::plot_roc(
        &config.output_dir.join("ROC_Curve.svg"),
        &grid.view(),
        &roc_mean.view(),
        &options.style,
    )?;

    let (mean_pred, observed) = metrics::calibration_curve(&all_true, &all_probs, 10)?;
    plot::plot_calibration(
        &config.output_dir.join("Calibration_Curve.svg"),
        &mean_pred,
        &observed,
        &options.style,
    )?;

    for (slot, lek) in lek_matrices.iter().enumerate() {
        export_response_curve(config, lek, &responses[slot], replicates, &options.style)?;
    }

    // ── 5. Summary surfaces ─────────────────────────────────────────────
    let surfaces = predict::export_mean_probability(
        &replicate_rasters,
        &config.output_dir,
        options.format,
    )?;

    Ok(SimulationSummary {
        replicates,
        probability_scores,
        binary_scores,
        importances,
        replicate_rasters,
        surfaces,
    })
}

fn summarise_importances(
    predictor_columns: &[String],
    runs: &[Array1<f64>],
    path: &std::path::Path,
) -> Result<Option<Vec<(String, f64, f64)>>> {
    if runs.is_empty() {
        return Ok(None);
    }
    if runs.iter().any(|r| r.len() != predictor_columns.len()) {
        return Err(Error::data(
            "importance vectors do not match the predictor columns",
        ));
    }
    let n = runs.len() as f64;
    let mut mean = Array1::zeros(predictor_columns.len());
    for run in runs {
        mean += run;
    }
    mean /= n;
    let mut variance = Array1::<f64>::zeros(predictor_columns.len());
    for run in runs {
        let diff = run - &mean;
        variance += &(&diff * &diff);
    }
    variance /= n;
    let std = variance.mapv(f64::sqrt);

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["Predictor", "Mean Importance", "Std"])?;
    let mut rows = Vec::with_capacity(predictor_columns.len());
    for (index, name) in predictor_columns.iter().enumerate() {
        writer.write_record([
            name.clone(),
            mean[index].to_string(),
            std[index].to_string(),
        ])?;
        rows.push((name.clone(), mean[index], std[index]));
    }
    writer.flush()?;
    Ok(Some(rows))
}

/// VIF and Pearson-correlation reports over the continuous predictors.
fn export_collinearity_reports(config: &SimulationConfig, table: &SampleTable) -> Result<()> {
    let continuous = config.continuous_names();
    let columns: Vec<usize> = continuous
        .iter()
        .filter_map(|name| table.column_index(name))
        .collect();
    if columns.is_empty() {
        return Ok(());
    }
    let names: Vec<&str> = continuous
        .iter()
        .filter(|name| table.column_index(name).is_some())
        .copied()
        .collect();
    let x = table.data().select(Axis(1), &columns);
    metrics::export_vif(
        &config.output_dir.join("VIF_Scores.csv"),
        &names,
        &x.view(),
    )?;
    metrics::export_correlation_matrix(
        &config.output_dir.join("Pearson_Correlation_Matrix.csv"),
        &names,
        &x.view(),
    )
}

fn export_response_curve(
    config: &SimulationConfig,
    lek: &LekMatrix,
    runs: &[Array1<f64>],
    replicates: usize,
    style: &PlotStyle,
) -> Result<()> {
    let (mean, std) = response::mean_responses(runs, replicates)?;
    let file_name = format!(
        "Response_{}.svg",
        lek.predictor.replace([' ', '/'], "_")
    );
    let path = config.output_dir.join(file_name);
    match &lek.axis {
        ResponseAxis::Continuous(values) => {
            plot::plot_continuous_response(&path, &lek.predictor, values, &mean.view(), &std.view(), style)
        }
        ResponseAxis::Categorical(classes) => {
            plot::plot_categorical_response(&path, &lek.predictor, classes, &mean.view(), &std.view(), style)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_specs_parse() {
        assert_eq!(
            Validation::parse("split-sample:0.25").unwrap(),
            Validation::SplitSample { test_fraction: 0.25 }
        );
        assert_eq!(
            Validation::parse("split-sample").unwrap(),
            Validation::SplitSample { test_fraction: 0.1 }
        );
        assert_eq!(Validation::parse("bootstrap").unwrap(), Validation::Bootstrap);
        assert_eq!(
            Validation::parse("kfold:5").unwrap(),
            Validation::KFold { folds: 5 }
        );
        assert_eq!(
            Validation::parse("kfold").unwrap(),
            Validation::KFold { folds: 10 }
        );
        assert!(Validation::parse("jackknife").is_err());
        assert!(Validation::parse("kfold:x").is_err());
    }
}
