//! Simulation configuration: the one mapping every pipeline stage reads.
//!
//! A config is deserialised from JSON (or assembled from a mask raster via
//! [`SimulationConfig::from_mask`]), validated once at pipeline entry, and
//! read-only from then on.

use std::fs::File;
use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::GridInfo;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Directory all run outputs are written into.
    pub output_dir: PathBuf,
    /// One single-band raster per environmental predictor.
    pub predictors: Vec<PathBuf>,
    /// Parallel to `predictors`: whether each holds class codes.
    pub categorical: Vec<bool>,
    /// Parallel to `predictors`: display names used in tables and charts.
    pub predictor_names: Vec<String>,
    /// Value marking invalid pixels in the predictors and outputs.
    pub no_data: f64,
    /// Binary validity mask raster; its grid is the reference grid.
    pub mask: PathBuf,
    pub geo_transform: [f64; 6],
    /// Spatial reference in WKT.
    pub projection: String,
    pub raster_width: usize,
    pub raster_height: usize,
}

impl SimulationConfig {
    /// Load a config from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingFile(path.to_path_buf()));
        }
        Ok(serde_json::from_reader(File::open(path)?)?)
    }

    /// Assemble a config taking the reference grid from the mask raster.
    pub fn from_mask(
        output_dir: PathBuf,
        mask: PathBuf,
        predictors: Vec<PathBuf>,
        categorical: Vec<bool>,
        predictor_names: Vec<String>,
        no_data: f64,
    ) -> Result<Self> {
        let grid = GridInfo::read(&mask)?;
        Ok(SimulationConfig {
            output_dir,
            predictors,
            categorical,
            predictor_names,
            no_data,
            mask,
            geo_transform: grid.geo_transform,
            projection: grid.projection,
            raster_width: grid.width,
            raster_height: grid.height,
        })
    }

    /// Check internal consistency. Safe to call repeatedly; a valid config
    /// passes unchanged every time.
    pub fn validate(&self) -> Result<()> {
        if self.predictors.is_empty() {
            return Err(Error::config("no predictor rasters given"));
        }
        if self.predictors.len() != self.categorical.len()
            || self.predictors.len() != self.predictor_names.len()
        {
            return Err(Error::config(format!(
                "{} predictors, {} categorical flags, {} names; the three lists must be parallel",
                self.predictors.len(),
                self.categorical.len(),
                self.predictor_names.len()
            )));
        }
        for path in self.predictors.iter().chain(std::iter::once(&self.mask)) {
            if !path.exists() {
                return Err(Error::MissingFile(path.clone()));
            }
        }
        if self.raster_width == 0 || self.raster_height == 0 {
            return Err(Error::config(format!(
                "raster size {}x{} is empty",
                self.raster_width, self.raster_height
            )));
        }
        if self.geo_transform[1] == 0.0 || self.geo_transform[5] == 0.0 {
            return Err(Error::config("geotransform has a zero pixel size"));
        }
        match GridInfo::read(&self.mask)?.no_data {
            Some(v) if v == 0.0 => {}
            other => warn!(
                "mask {} no-data is {:?}; a zero no-data value is expected",
                self.mask.display(),
                other
            ),
        }
        Ok(())
    }

    /// The reference grid every predictor must share.
    pub fn grid(&self) -> GridInfo {
        GridInfo {
            geo_transform: self.geo_transform,
            projection: self.projection.clone(),
            width: self.raster_width,
            height: self.raster_height,
            no_data: Some(self.no_data),
        }
    }

    /// Names of the continuous (non-categorical) predictors, in order.
    pub fn continuous_names(&self) -> Vec<&str> {
        self.predictor_names
            .iter()
            .zip(&self.categorical)
            .filter(|(_, &cat)| !cat)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Names of the categorical predictors, in order.
    pub fn categorical_names(&self) -> Vec<&str> {
        self.predictor_names
            .iter()
            .zip(&self.categorical)
            .filter(|(_, &cat)| cat)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
