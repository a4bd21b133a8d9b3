//! Applying a fitted model across whole rasters, plus the elementwise
//! raster algebra over exported probability surfaces.
//!
//! Everything here walks the shared block-window sequence, so memory use is
//! bounded by one block of the predictor stack regardless of raster size.

use std::path::{Path, PathBuf};

use ndarray::Array2;

use crate::error::{Error, Result};
use crate::estimator::Classifier;
use crate::config::SimulationConfig;
use crate::raster::{self, BlockWindow, GridInfo, OutputFormat, RasterStack};

/// Offset added to every valid probability pixel so a genuine zero
/// probability stays distinguishable from the no-data value.
pub const PROBABILITY_EPSILON: f64 = 1e-6;

/// Predict the positive-class probability surface of a fitted model over
/// the configured predictor stack and write it to `out_path`.
///
/// Pixels where the validity mask equals its no-data value are written as
/// no-data (0); all others carry `probability + PROBABILITY_EPSILON`.
pub fn export_presence_image(
    model: &dyn Classifier,
    config: &SimulationConfig,
    out_path: &Path,
    format: OutputFormat,
    whole_image: bool,
) -> Result<()> {
    let stack = RasterStack::open(&config.predictors)?;
    let mask_ds = raster::open(&config.mask)?;
    let mask_invalid = GridInfo::from_dataset(&mask_ds)?
        .no_data
        .unwrap_or(config.no_data);

    let mut out_grid = config.grid();
    out_grid.no_data = Some(0.0);
    let mut out_ds = raster::create_grid(out_path, &out_grid, format)?;

    for window in stack.windows(whole_image)? {
        let features = stack.read_features(window)?;
        let probs = model.predict_proba(&features.view());
        let mask = raster::read_window(&mask_ds, window)?;

        let mut block = Array2::zeros((window.height, window.width));
        for row in 0..window.height {
            for col in 0..window.width {
                let pixel = row * window.width + col;
                block[[row, col]] = if mask[[row, col]] == mask_invalid {
                    0.0
                } else {
                    probs[pixel] + PROBABILITY_EPSILON
                };
            }
        }
        raster::write_window(&out_ds, window, &block)?;
    }
    raster::build_overviews(&mut out_ds)
}

/// Output paths of [`export_mean_probability`].
pub struct SummarySurfaces {
    pub mean: PathBuf,
    pub std_dev: PathBuf,
    pub cv: PathBuf,
}

/// Pixelwise mean, standard deviation, and coefficient of variation across
/// a stack of probability rasters (one per replicate), written as
/// `Mean`, `StDev`, and `CV` rasters in `out_dir`.
pub fn export_mean_probability(
    replicate_paths: &[PathBuf],
    out_dir: &Path,
    format: OutputFormat,
) -> Result<SummarySurfaces> {
    if replicate_paths.is_empty() {
        return Err(Error::data("no replicate rasters to summarise"));
    }
    let stack = RasterStack::open(replicate_paths)?;
    let mut grid = stack.grid().clone();
    grid.no_data = Some(0.0);

    let out = SummarySurfaces {
        mean: out_dir.join(format!("Mean.{}", format.extension())),
        std_dev: out_dir.join(format!("StDev.{}", format.extension())),
        cv: out_dir.join(format!("CV.{}", format.extension())),
    };
    let mut mean_ds = raster::create_grid(&out.mean, &grid, format)?;
    let mut std_ds = raster::create_grid(&out.std_dev, &grid, format)?;
    let mut cv_ds = raster::create_grid(&out.cv, &grid, format)?;

    let n = replicate_paths.len() as f64;
    for window in stack.windows(false)? {
        let blocks = stack.read_window(window)?;
        let shape = (window.height, window.width);
        let mut mean = Array2::zeros(shape);
        for block in &blocks {
            mean += block;
        }
        mean /= n;
        let mut variance = Array2::<f64>::zeros(shape);
        for block in &blocks {
            let diff = block - &mean;
            variance += &(&diff * &diff);
        }
        variance /= n;
        let std = variance.mapv(f64::sqrt);
        let cv = ndarray::Zip::from(&std)
            .and(&mean)
            .map_collect(|&s, &m| if m.abs() > 1e-12 { s / m } else { 0.0 });

        raster::write_window(&mean_ds, window, &mean)?;
        raster::write_window(&std_ds, window, &std)?;
        raster::write_window(&cv_ds, window, &cv)?;
    }
    raster::build_overviews(&mut mean_ds)?;
    raster::build_overviews(&mut std_ds)?;
    raster::build_overviews(&mut cv_ds)?;
    Ok(out)
}

/// Threshold a probability surface into a binary presence map: pixels at or
/// above `threshold` become 1, the rest 0.
pub fn classify_presence(
    probability_path: &Path,
    threshold: f64,
    out_path: &Path,
    format: OutputFormat,
) -> Result<()> {
    let stack = RasterStack::open(&[probability_path.to_path_buf()])?;
    let mut grid = stack.grid().clone();
    grid.no_data = Some(0.0);
    let mut out_ds = raster::create_grid(out_path, &grid, format)?;
    for window in stack.windows(false)? {
        let block = stack.read_window(window)?.remove(0);
        let classified = block.mapv(|v| if v >= threshold { 1.0 } else { 0.0 });
        raster::write_window(&out_ds, window, &classified)?;
    }
    raster::build_overviews(&mut out_ds)
}

/// Agreement counts reported by [`habitat_overlap`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlapCounts {
    pub neither: u64,
    pub only_first: u64,
    pub only_second: u64,
    pub both: u64,
}

/// Compare two binary presence maps pixelwise, writing a coded agreement
/// raster (0 neither, 1 first only, 2 second only, 3 both) and returning
/// the per-code pixel counts.
pub fn habitat_overlap(
    first_path: &Path,
    second_path: &Path,
    out_path: &Path,
    format: OutputFormat,
) -> Result<OverlapCounts> {
    let stack = RasterStack::open(&[first_path.to_path_buf(), second_path.to_path_buf()])?;
    let grid = stack.grid().clone();
    let mut out_ds = raster::create_grid(out_path, &grid, format)?;
    let mut counts = OverlapCounts::default();
    for window in stack.windows(false)? {
        let blocks = stack.read_window(window)?;
        let mut coded = Array2::zeros((window.height, window.width));
        for row in 0..window.height {
            for col in 0..window.width {
                let first = blocks[0][[row, col]] != 0.0;
                let second = blocks[1][[row, col]] != 0.0;
                let code = match (first, second) {
                    (false, false) => {
                        counts.neither += 1;
                        0.0
                    }
                    (true, false) => {
                        counts.only_first += 1;
                        1.0
                    }
                    (false, true) => {
                        counts.only_second += 1;
                        2.0
                    }
                    (true, true) => {
                        counts.both += 1;
                        3.0
                    }
                };
                coded[[row, col]] = code;
            }
        }
        raster::write_window(&out_ds, window, &coded)?;
    }
    raster::build_overviews(&mut out_ds)?;
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::block_windows;

    fn write_raster(path: &Path, values: &Array2<f64>) {
        let grid = GridInfo {
            geo_transform: [0.0, 1.0, 0.0, values.nrows() as f64, 0.0, -1.0],
            projection: String::new(),
            width: values.ncols(),
            height: values.nrows(),
            no_data: Some(0.0),
        };
        let dataset = raster::create_grid(path, &grid, OutputFormat::GTiff).unwrap();
        let window = BlockWindow {
            x: 0,
            y: 0,
            width: grid.width,
            height: grid.height,
        };
        raster::write_window(&dataset, window, values).unwrap();
    }

    fn read_raster(path: &Path) -> Array2<f64> {
        let dataset = raster::open(path).unwrap();
        let grid = GridInfo::from_dataset(&dataset).unwrap();
        raster::read_window(
            &dataset,
            BlockWindow { x: 0, y: 0, width: grid.width, height: grid.height },
        )
        .unwrap()
    }

    #[test]
    fn classify_thresholds_the_surface() {
        let dir = tempfile::tempdir().unwrap();
        let probs = dir.path().join("probs.tif");
        write_raster(
            &probs,
            &ndarray::array![[0.1, 0.6], [0.5, 0.9]],
        );
        let out = dir.path().join("classified.tif");
        classify_presence(&probs, 0.5, &out, OutputFormat::GTiff).unwrap();
        assert_eq!(read_raster(&out), ndarray::array![[0.0, 1.0], [1.0, 1.0]]);
    }

    #[test]
    fn overlap_codes_and_counts_agree() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.tif");
        let second = dir.path().join("second.tif");
        write_raster(&first, &ndarray::array![[1.0, 1.0], [0.0, 0.0]]);
        write_raster(&second, &ndarray::array![[1.0, 0.0], [1.0, 0.0]]);
        let out = dir.path().join("overlap.tif");
        let counts =
            habitat_overlap(&first, &second, &out, OutputFormat::GTiff).unwrap();
        assert_eq!(
            counts,
            OverlapCounts { neither: 1, only_first: 1, only_second: 1, both: 1 }
        );
        assert_eq!(read_raster(&out), ndarray::array![[3.0, 1.0], [2.0, 0.0]]);
    }

    #[test]
    fn summary_surfaces_average_the_stack() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("Run_000.tif");
        let b = dir.path().join("Run_001.tif");
        write_raster(&a, &ndarray::array![[0.2, 0.4], [0.6, 0.8]]);
        write_raster(&b, &ndarray::array![[0.4, 0.6], [0.6, 1.0]]);
        let out = export_mean_probability(
            &[a, b],
            dir.path(),
            OutputFormat::GTiff,
        )
        .unwrap();
        let mean = read_raster(&out.mean);
        assert!((mean[[0, 0]] - 0.3).abs() < 1e-5);
        assert!((mean[[1, 1]] - 0.9).abs() < 1e-5);
        let std = read_raster(&out.std_dev);
        assert!((std[[1, 0]] - 0.0).abs() < 1e-5);
        assert!(std[[0, 0]] > 0.05);
    }

    #[test]
    fn block_windows_tile_the_grid_used_here() {
        let total: usize = block_windows((130, 70), (64, 16))
            .map(|w| w.pixels())
            .sum();
        assert_eq!(total, 130 * 70);
    }
}
