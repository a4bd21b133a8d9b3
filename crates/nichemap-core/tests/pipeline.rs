//! End-to-end simulation over small GTiff fixtures: build aligned
//! predictors and a validity mask, sample pseudo-absences, extract a
//! table, and run the replicate engine both ways.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

use nichemap_core::config::SimulationConfig;
use nichemap_core::estimator::{GbtParams, MetaLearner, TreeEstimator};
use nichemap_core::raster::{self, BlockWindow, GridInfo, OutputFormat};
use nichemap_core::replicate::{
    run_meta_simulation, run_tree_simulation, RunOptions, Validation,
};
use nichemap_core::sample;
use nichemap_core::table::SampleTable;

const WIDTH: usize = 10;
const HEIGHT: usize = 10;

fn fixture_grid() -> GridInfo {
    GridInfo {
        geo_transform: [500_000.0, 10.0, 0.0, 4_650_000.0, 0.0, -10.0],
        projection: String::new(),
        width: WIDTH,
        height: HEIGHT,
        no_data: Some(0.0),
    }
}

fn write_fixture(path: &Path, values: Array2<f64>) {
    let dataset = raster::create_grid(path, &fixture_grid(), OutputFormat::GTiff).unwrap();
    let window = BlockWindow { x: 0, y: 0, width: WIDTH, height: HEIGHT };
    raster::write_window(&dataset, window, &values).unwrap();
}

/// Four aligned predictors, an all-valid mask, and a config over them.
fn build_fixtures(dir: &Path) -> SimulationConfig {
    let predictors = vec![
        dir.join("gradient_x.tif"),
        dir.join("gradient_y.tif"),
        dir.join("ripple.tif"),
        dir.join("soil.tif"),
    ];
    write_fixture(
        &predictors[0],
        Array2::from_shape_fn((HEIGHT, WIDTH), |(_, col)| col as f64 + 1.0),
    );
    write_fixture(
        &predictors[1],
        Array2::from_shape_fn((HEIGHT, WIDTH), |(row, _)| row as f64 + 1.0),
    );
    write_fixture(
        &predictors[2],
        Array2::from_shape_fn((HEIGHT, WIDTH), |(row, col)| ((row + col) % 5) as f64 + 1.0),
    );
    write_fixture(
        &predictors[3],
        Array2::from_shape_fn((HEIGHT, WIDTH), |(row, _)| if row < 5 { 1.0 } else { 2.0 }),
    );
    let mask = dir.join("mask.tif");
    write_fixture(&mask, Array2::ones((HEIGHT, WIDTH)));

    SimulationConfig::from_mask(
        dir.join("outputs"),
        mask,
        predictors,
        vec![false, false, false, true],
        vec![
            "Gradient X".into(),
            "Gradient Y".into(),
            "Ripple".into(),
            "Soil".into(),
        ],
        0.0,
    )
    .unwrap()
}

/// Presences in the high-`Gradient X` half, absences in the low half.
fn build_table(config: &SimulationConfig, rng: &mut StdRng) -> SampleTable {
    let grid = config.grid();
    let mut presences = Vec::new();
    for row in 0..HEIGHT {
        for col in 6..WIDTH {
            presences.push(grid.centre_of(col, row));
        }
    }
    let absences: Vec<(f64, f64)> = (0..HEIGHT)
        .flat_map(|row| (0..4).map(move |col| (col, row)))
        .map(|(col, row)| grid.centre_of(col, row))
        .collect();

    let presence_table = sample::extract_raster_values(config, &presences).unwrap();
    let absence_table = sample::extract_raster_values(config, &absences).unwrap();
    let presence_table = presence_table
        .with_label(&vec![1u8; presence_table.n_rows()])
        .unwrap();
    let absence_table = absence_table
        .with_label(&vec![0u8; absence_table.n_rows()])
        .unwrap();
    let table = SampleTable::concat(&[&presence_table, &absence_table]).unwrap();
    sample::equalise_records(&table, rng).unwrap()
}

#[test]
fn pseudoabsences_land_on_valid_mask_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let config = build_fixtures(dir.path());
    let mut rng = StdRng::seed_from_u64(11);
    let points = sample::generate_pseudoabsences(&config, 20, &mut rng).unwrap();
    assert!(points.len() <= 20);
    assert!(!points.is_empty());
    let grid = config.grid();
    let (xmin, ymin, xmax, ymax) = grid.bounds();
    for &(x, y) in &points {
        assert!(x >= xmin && x < xmax && y >= ymin && y < ymax);
        // All mask pixels are valid, so every draw must resolve to one.
        assert!(grid.pixel_of(x, y).is_some());
    }
}

#[test]
fn validate_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = build_fixtures(dir.path());
    config.validate().unwrap();
    config.validate().unwrap();
}

#[test]
fn tree_simulation_writes_the_full_output_set() {
    let dir = tempfile::tempdir().unwrap();
    let config = build_fixtures(dir.path());
    let mut rng = StdRng::seed_from_u64(3);
    let table = build_table(&config, &mut rng);

    let options = RunOptions {
        replicates: 3,
        validation: Validation::SplitSample { test_fraction: 0.4 },
        seed: 7,
        ..RunOptions::default()
    };
    let estimator = TreeEstimator::parse("random-forest").unwrap();
    let summary = run_tree_simulation(&config, &table, &estimator, &options).unwrap();

    assert_eq!(summary.replicates, 3);
    assert_eq!(summary.replicate_rasters.len(), 3);
    for path in &summary.replicate_rasters {
        assert!(path.exists(), "{} missing", path.display());
    }
    let out = &config.output_dir;
    for name in [
        "Accuracy_Stats.csv",
        "Variable_Importance_Scores.csv",
        "VIF_Scores.csv",
        "Pearson_Correlation_Matrix.csv",
        "ROC_Curve.svg",
        "Calibration_Curve.svg",
        "Response_Gradient_X.svg",
        "Response_Soil.svg",
        "Mean.tif",
        "StDev.tif",
        "CV.tif",
    ] {
        assert!(out.join(name).exists(), "{name} missing");
    }

    // The separating predictor carries the importance signal.
    let importances = summary.importances.unwrap();
    let gradient_x = importances
        .iter()
        .find(|(name, _, _)| name == "Gradient X")
        .unwrap();
    assert!(gradient_x.1 > 0.3, "Gradient X importance {}", gradient_x.1);

    // Held-out ranking on separable data is strong.
    let auc = summary
        .probability_scores
        .iter()
        .find(|(name, _)| *name == "AUC")
        .unwrap()
        .1;
    assert!(auc > 0.8, "AUC {auc}");

    // Replicate surfaces carry probabilities plus the epsilon offset.
    let run0 = raster::open(&summary.replicate_rasters[0]).unwrap();
    let probs = raster::read_window(
        &run0,
        BlockWindow { x: 0, y: 0, width: WIDTH, height: HEIGHT },
    )
    .unwrap();
    assert!(probs.iter().all(|&p| (0.0..=1.01).contains(&p)));
    // High-gradient side scores higher than the low side.
    assert!(probs[[5, 9]] > probs[[5, 0]]);
}

#[test]
fn meta_simulation_runs_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let config = build_fixtures(dir.path());
    let mut rng = StdRng::seed_from_u64(5);
    let table = build_table(&config, &mut rng);

    let options = RunOptions {
        replicates: 2,
        validation: Validation::Bootstrap,
        seed: 13,
        ..RunOptions::default()
    };
    let transform = GbtParams {
        n_estimators: 15,
        ..GbtParams::default()
    };
    let meta = MetaLearner::parse("maxent").unwrap();
    let summary = run_meta_simulation(&config, &table, &transform, &meta, &options).unwrap();
    assert_eq!(summary.replicates, 2);
    assert!(summary.surfaces.mean.exists());
    assert!(summary.importances.is_some());
}

#[test]
fn misaligned_predictor_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = build_fixtures(dir.path());

    // One predictor on a shifted grid.
    let odd: PathBuf = dir.path().join("shifted.tif");
    let grid = GridInfo {
        geo_transform: [500_005.0, 10.0, 0.0, 4_650_000.0, 0.0, -10.0],
        ..fixture_grid()
    };
    let dataset = raster::create_grid(&odd, &grid, OutputFormat::GTiff).unwrap();
    raster::write_window(
        &dataset,
        BlockWindow { x: 0, y: 0, width: WIDTH, height: HEIGHT },
        &Array2::ones((HEIGHT, WIDTH)),
    )
    .unwrap();
    drop(dataset);
    config.predictors[0] = odd;
    config.predictor_names[0] = "Shifted".into();

    let mut rng = StdRng::seed_from_u64(3);
    let table = build_table(&config, &mut rng);
    let estimator = TreeEstimator::parse("decision-tree").unwrap();
    let err = run_tree_simulation(&config, &table, &estimator, &RunOptions::default());
    assert!(err.is_err());
}
