//! Error kinds shared across the crate.
//!
//! Every fallible library function returns `Result<_, Error>`. The kinds let
//! a caller decide whether a failure is a bad configuration, bad data, or an
//! I/O problem, instead of every failure being terminal.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The simulation configuration is internally inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// A referenced raster, vector, or output path does not exist.
    #[error("missing file: {}", .0.display())]
    MissingFile(PathBuf),

    /// Input records have the wrong shape or content.
    #[error("data error: {0}")]
    Data(String),

    /// An estimator was fitted or applied incorrectly.
    #[error("estimator error: {0}")]
    Estimator(String),

    /// Failure while rendering a chart.
    #[error("plot error: {0}")]
    Plot(String),

    #[error("raster error: {0}")]
    Raster(#[from] gdal::errors::GdalError),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a `Data` error built from format arguments.
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}
