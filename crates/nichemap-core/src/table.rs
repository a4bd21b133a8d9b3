//! The presence/absence sample table and train/test partitioning.
//!
//! A `SampleTable` is a dense f64 record matrix with named columns; the
//! binary response lives in an ordinary column named [`LABEL_COLUMN`].
//! Every operation returns a new table.

use log::warn;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Error, Result};

/// Name of the binary presence/absence response column.
pub const LABEL_COLUMN: &str = "presence";

/// Fallback test fraction when a caller passes one outside (0, 1).
pub const DEFAULT_TEST_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct SampleTable {
    columns: Vec<String>,
    data: Array2<f64>,
}

impl SampleTable {
    pub fn new(columns: Vec<String>, data: Array2<f64>) -> Result<Self> {
        if columns.len() != data.ncols() {
            return Err(Error::data(format!(
                "{} column names for {} data columns",
                columns.len(),
                data.ncols()
            )));
        }
        Ok(SampleTable { columns, data })
    }

    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let index = self
            .column_index(name)
            .ok_or_else(|| Error::data(format!("no column named '{name}'")))?;
        Ok(self.data.column(index))
    }

    /// Append the binary response column.
    pub fn with_label(&self, labels: &[u8]) -> Result<Self> {
        if labels.len() != self.n_rows() {
            return Err(Error::data(format!(
                "{} labels for {} records",
                labels.len(),
                self.n_rows()
            )));
        }
        let mut columns = self.columns.clone();
        columns.push(LABEL_COLUMN.to_string());
        let mut data = Array2::zeros((self.n_rows(), self.n_cols() + 1));
        data.slice_mut(ndarray::s![.., ..self.n_cols()])
            .assign(&self.data);
        for (row, &label) in labels.iter().enumerate() {
            data[[row, self.n_cols()]] = label as f64;
        }
        SampleTable::new(columns, data)
    }

    /// A new table containing the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        SampleTable {
            columns: self.columns.clone(),
            data: self.data.select(Axis(0), rows),
        }
    }

    /// A new table without the named columns.
    pub fn drop_columns(&self, names: &[&str]) -> Self {
        let keep: Vec<usize> = (0..self.n_cols())
            .filter(|&i| !names.contains(&self.columns[i].as_str()))
            .collect();
        SampleTable {
            columns: keep.iter().map(|&i| self.columns[i].clone()).collect(),
            data: self.data.select(Axis(1), &keep),
        }
    }

    /// Stack tables with identical column layouts.
    pub fn concat(tables: &[&SampleTable]) -> Result<Self> {
        let first = tables
            .first()
            .ok_or_else(|| Error::data("nothing to concatenate"))?;
        for table in &tables[1..] {
            if table.columns != first.columns {
                return Err(Error::data("column layouts differ between tables"));
            }
        }
        let views: Vec<_> = tables.iter().map(|t| t.data.view()).collect();
        let data = ndarray::concatenate(Axis(0), &views)?;
        SampleTable::new(first.columns.clone(), data)
    }
}

/// Shuffle, then slice the first `floor(fraction * n)` rows off as the test
/// partition. A fraction outside (0, 1) falls back to
/// [`DEFAULT_TEST_FRACTION`] with a warning.
pub fn train_test_split(
    table: &SampleTable,
    fraction: f64,
    rng: &mut impl Rng,
) -> (SampleTable, SampleTable) {
    let fraction = if fraction > 0.0 && fraction < 1.0 {
        fraction
    } else {
        warn!(
            "test fraction {fraction} outside (0, 1); using {DEFAULT_TEST_FRACTION}"
        );
        DEFAULT_TEST_FRACTION
    };
    let mut rows: Vec<usize> = (0..table.n_rows()).collect();
    rows.shuffle(rng);
    let n_test = (fraction * table.n_rows() as f64).floor() as usize;
    let test = table.select_rows(&rows[..n_test]);
    let train = table.select_rows(&rows[n_test..]);
    (train, test)
}

/// Bootstrap partition: the training set is `n` draws with replacement and
/// the test set is the entire original table (Guisan et al.'s bootstrap
/// validation protocol).
pub fn bootstrap_split(table: &SampleTable, rng: &mut impl Rng) -> (SampleTable, SampleTable) {
    let n = table.n_rows();
    let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
    (table.select_rows(&rows), table.clone())
}

/// Shuffle then split into `folds` near-equal partitions.
pub fn kfold_split(
    table: &SampleTable,
    folds: usize,
    rng: &mut impl Rng,
) -> Result<Vec<SampleTable>> {
    if folds < 2 || folds > table.n_rows() {
        return Err(Error::data(format!(
            "cannot split {} records into {folds} folds",
            table.n_rows()
        )));
    }
    let mut rows: Vec<usize> = (0..table.n_rows()).collect();
    rows.shuffle(rng);
    let base = table.n_rows() / folds;
    let extra = table.n_rows() % folds;
    let mut parts = Vec::with_capacity(folds);
    let mut start = 0;
    for fold in 0..folds {
        let len = base + usize::from(fold < extra);
        parts.push(table.select_rows(&rows[start..start + len]));
        start += len;
    }
    Ok(parts)
}

/// Separate the predictor matrix from the binary response vector.
pub fn split_xy(table: &SampleTable) -> Result<(Array2<f64>, Array1<f64>)> {
    let label = table
        .column_index(LABEL_COLUMN)
        .ok_or_else(|| Error::data(format!("table has no '{LABEL_COLUMN}' column")))?;
    let y = table.data().column(label).to_owned();
    if y.iter().any(|&v| v != 0.0 && v != 1.0) {
        return Err(Error::data(format!(
            "'{LABEL_COLUMN}' column contains values other than 0 and 1"
        )));
    }
    let keep: Vec<usize> = (0..table.n_cols()).filter(|&i| i != label).collect();
    let x = table.data().select(Axis(1), &keep);
    Ok((x, y))
}
