//! Occurrence sample preparation: pseudo-absence generation, raster value
//! extraction, and the record filters applied before model fitting.
//!
//! Coordinates are (x, y) pairs in the configuration's spatial reference.
//! Filters never reorder the records they keep.

use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::SimulationConfig;
use crate::error::{Error, Result};
use crate::raster::{self, BlockWindow, GridInfo};
use crate::table::{SampleTable, LABEL_COLUMN};

pub type Coordinate = (f64, f64);

/// Draw up to `n_points` pseudo-absence coordinates uniformly inside the
/// mask's bounding box, keeping only draws that land on a valid mask pixel.
///
/// Fewer than `n_points` come back when draws land on no-data pixels; zero
/// survivors is an error rather than a silent fallback, since it means the
/// mask has no valid region to sample.
pub fn generate_pseudoabsences(
    config: &SimulationConfig,
    n_points: usize,
    rng: &mut impl Rng,
) -> Result<Vec<Coordinate>> {
    let dataset = raster::open(&config.mask)?;
    let grid = GridInfo::from_dataset(&dataset)?;
    let mask = raster::read_window(
        &dataset,
        BlockWindow {
            x: 0,
            y: 0,
            width: grid.width,
            height: grid.height,
        },
    )?;
    let invalid = grid.no_data.unwrap_or(0.0);
    let (xmin, ymin, xmax, ymax) = grid.bounds();

    let mut points = Vec::with_capacity(n_points);
    for _ in 0..n_points {
        let x = rng.gen_range(xmin..xmax);
        let y = rng.gen_range(ymin..ymax);
        if let Some((col, row)) = grid.pixel_of(x, y) {
            if mask[[row, col]] != invalid {
                points.push((x, y));
            }
        }
    }
    if points.is_empty() {
        return Err(Error::data(format!(
            "no pseudo-absence draws landed on valid pixels of {}",
            config.mask.display()
        )));
    }
    Ok(points)
}

/// Read every predictor at every coordinate into a sample table whose
/// column order matches the configured predictor names.
///
/// Coordinates outside the reference grid are an error that lists the
/// offending points; a failed read is never folded into a real value.
pub fn extract_raster_values(
    config: &SimulationConfig,
    coordinates: &[Coordinate],
) -> Result<SampleTable> {
    let grid = config.grid();
    let mut pixels = Vec::with_capacity(coordinates.len());
    let mut outside = Vec::new();
    for &(x, y) in coordinates {
        match grid.pixel_of(x, y) {
            Some(pixel) => pixels.push(pixel),
            None => outside.push((x, y)),
        }
    }
    if !outside.is_empty() {
        return Err(Error::data(format!(
            "{} coordinate(s) fall outside the reference grid: {:?}",
            outside.len(),
            &outside[..outside.len().min(10)]
        )));
    }

    let mut data = Array2::zeros((coordinates.len(), config.predictors.len()));
    for (band, path) in config.predictors.iter().enumerate() {
        let dataset = raster::open(path)?;
        for (row, &(col, line)) in pixels.iter().enumerate() {
            let value = raster::read_window(
                &dataset,
                BlockWindow {
                    x: col as isize,
                    y: line as isize,
                    width: 1,
                    height: 1,
                },
            )?;
            data[[row, band]] = value[[0, 0]];
        }
    }
    SampleTable::new(config.predictor_names.clone(), data)
}

/// Drop records containing the null value or a non-finite entry.
pub fn drop_null_records(table: &SampleTable, null_value: f64) -> SampleTable {
    let keep: Vec<usize> = (0..table.n_rows())
        .filter(|&row| {
            table
                .data()
                .row(row)
                .iter()
                .all(|&v| v.is_finite() && v != null_value)
        })
        .collect();
    table.select_rows(&keep)
}

/// Drop candidate coordinates whose nearest presence record lies closer
/// than `min_distance`. Survivors keep their input order.
pub fn drop_proximal_records(
    candidates: &[Coordinate],
    presences: &[Coordinate],
    min_distance: f64,
) -> Vec<Coordinate> {
    let limit = min_distance * min_distance;
    candidates
        .iter()
        .copied()
        .filter(|&(x, y)| {
            presences
                .iter()
                .all(|&(px, py)| (x - px).powi(2) + (y - py).powi(2) >= limit)
        })
        .collect()
}

/// Randomly subsample absence records down to the presence count so the two
/// classes are balanced. Kept records stay in their original order.
pub fn equalise_records(table: &SampleTable, rng: &mut impl Rng) -> Result<SampleTable> {
    let labels = table.column(LABEL_COLUMN)?;
    let presences: Vec<usize> = (0..table.n_rows()).filter(|&r| labels[r] == 1.0).collect();
    let absences: Vec<usize> = (0..table.n_rows()).filter(|&r| labels[r] == 0.0).collect();
    if absences.len() <= presences.len() {
        return Ok(table.clone());
    }
    let mut chosen = absences;
    chosen.shuffle(rng);
    chosen.truncate(presences.len());
    let mut keep: Vec<usize> = presences.into_iter().chain(chosen).collect();
    keep.sort_unstable();
    Ok(table.select_rows(&keep))
}

/// Drop the categorical predictor columns.
pub fn drop_categoricals(table: &SampleTable, config: &SimulationConfig) -> SampleTable {
    let names = config.categorical_names();
    table.drop_columns(&names)
}

/// One-hot encode each categorical predictor column into one indicator
/// column per observed class, named `<predictor>=<class>`. Continuous
/// columns and the label column pass through unchanged.
pub fn encode_categoricals(table: &SampleTable, config: &SimulationConfig) -> Result<SampleTable> {
    let categorical = config.categorical_names();
    let mut columns = Vec::new();
    let mut encoded: Vec<Vec<f64>> = Vec::new();
    for (index, name) in table.columns().iter().enumerate() {
        let values = table.data().column(index);
        if !categorical.contains(&name.as_str()) {
            columns.push(name.clone());
            encoded.push(values.to_vec());
            continue;
        }
        let mut classes: Vec<f64> = values.to_vec();
        classes.sort_by(|a, b| a.partial_cmp(b).expect("finite class codes"));
        classes.dedup();
        for class in classes {
            columns.push(format!("{name}={class}"));
            encoded.push(
                values
                    .iter()
                    .map(|&v| if v == class { 1.0 } else { 0.0 })
                    .collect(),
            );
        }
    }
    let mut data = Array2::zeros((table.n_rows(), encoded.len()));
    for (col, values) in encoded.iter().enumerate() {
        for (row, &v) in values.iter().enumerate() {
            data[[row, col]] = v;
        }
    }
    SampleTable::new(columns, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
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

    #[test]
    fn null_records_are_dropped_in_order() {
        let data = array![[1.0, 2.0], [0.0, 3.0], [4.0, f64::NAN], [5.0, 6.0]];
        let table = SampleTable::new(vec!["a".into(), "b".into()], data).unwrap();
        let kept = drop_null_records(&table, 0.0);
        assert_eq!(kept.n_rows(), 2);
        assert_eq!(kept.data().row(0).to_vec(), vec![1.0, 2.0]);
        assert_eq!(kept.data().row(1).to_vec(), vec![5.0, 6.0]);
    }

    #[test]
    fn proximal_candidates_are_dropped() {
        let presences = vec![(0.0, 0.0), (10.0, 10.0)];
        let candidates = vec![(0.5, 0.5), (5.0, 5.0), (10.2, 10.2), (20.0, 20.0)];
        let kept = drop_proximal_records(&candidates, &presences, 1.0);
        assert_eq!(kept, vec![(5.0, 5.0), (20.0, 20.0)]);
    }

    #[test]
    fn equalise_balances_the_classes() {
        let data = Array2::from_shape_fn((10, 1), |(r, _)| r as f64);
        let table = SampleTable::new(vec!["a".into()], data).unwrap();
        let labels = [1, 1, 0, 0, 0, 0, 0, 0, 0, 0];
        let labelled = table.with_label(&labels).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let balanced = equalise_records(&labelled, &mut rng).unwrap();
        assert_eq!(balanced.n_rows(), 4);
        let kept_labels = balanced.column(LABEL_COLUMN).unwrap();
        assert_eq!(kept_labels.iter().filter(|&&v| v == 1.0).count(), 2);
    }

    #[test]
    fn one_hot_encoding_expands_classes() {
        let data = array![[1.5, 3.0], [2.5, 1.0], [3.5, 3.0]];
        let table = SampleTable::new(vec!["elev".into(), "soil".into()], data).unwrap();
        let config = config(&["elev", "soil"], &[false, true]);
        let encoded = encode_categoricals(&table, &config).unwrap();
        assert_eq!(
            encoded.columns(),
            &["elev".to_string(), "soil=1".to_string(), "soil=3".to_string()]
        );
        assert_eq!(encoded.data().column(1).to_vec(), vec![0.0, 1.0, 0.0]);
        assert_eq!(encoded.data().column(2).to_vec(), vec![1.0, 0.0, 1.0]);
    }
}
