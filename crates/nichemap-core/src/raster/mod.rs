//! Thin wrapper over the `gdal` crate: grid metadata, dataset open/create,
//! block read/write, and overview building. Pixel arithmetic lives in the
//! callers; this module only moves rectangular windows in and out of GDAL.

pub mod align;
pub mod blocks;

pub use blocks::{block_windows, BlockWindow, RasterStack};

use std::path::Path;

use gdal::raster::{Buffer, RasterCreationOptions};
use gdal::{Dataset, DriverManager};
use ndarray::Array2;

use crate::error::{Error, Result};

/// Overview (pyramid) levels built on every exported raster.
pub const OVERVIEW_LEVELS: [i32; 6] = [4, 8, 16, 32, 64, 128];
/// Resampling used when building overviews.
pub const OVERVIEW_RESAMPLING: &str = "NEAREST";

/// Output raster format for exported surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    GTiff,
    Kea,
}

impl OutputFormat {
    pub fn driver_name(self) -> &'static str {
        match self {
            OutputFormat::GTiff => "GTiff",
            OutputFormat::Kea => "KEA",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::GTiff => "tif",
            OutputFormat::Kea => "kea",
        }
    }

    fn creation_options(self) -> RasterCreationOptions {
        match self {
            // DEFLATE + tiling only applies to GTiff.
            OutputFormat::GTiff => {
                RasterCreationOptions::from_iter(["COMPRESS=DEFLATE", "TILED=YES"])
            }
            OutputFormat::Kea => RasterCreationOptions::default(),
        }
    }
}

/// Geo-referencing and shape of one single-band raster grid.
///
/// Pixel (col, row) maps to world coordinates through the six-element
/// geotransform; `pixel_of` inverts that mapping with truncation toward zero.
#[derive(Debug, Clone, PartialEq)]
pub struct GridInfo {
    pub geo_transform: [f64; 6],
    pub projection: String,
    pub width: usize,
    pub height: usize,
    pub no_data: Option<f64>,
}

impl GridInfo {
    pub fn from_dataset(dataset: &Dataset) -> Result<Self> {
        let (width, height) = dataset.raster_size();
        let band = dataset.rasterband(1)?;
        Ok(GridInfo {
            geo_transform: dataset.geo_transform()?,
            projection: dataset.projection(),
            width,
            height,
            no_data: band.no_data_value(),
        })
    }

    /// Read grid metadata from a raster on disk.
    pub fn read(path: &Path) -> Result<Self> {
        let dataset = open(path)?;
        Self::from_dataset(&dataset)
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.geo_transform[0], self.geo_transform[3])
    }

    /// (pixel width, pixel height); pixel height is negative for
    /// north-up rasters.
    pub fn pixel_size(&self) -> (f64, f64) {
        (self.geo_transform[1], self.geo_transform[5])
    }

    /// World bounding box as (xmin, ymin, xmax, ymax).
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let (ox, oy) = self.origin();
        let (pw, ph) = self.pixel_size();
        let xmax = ox + pw * self.width as f64;
        let ymin = oy + ph * self.height as f64;
        (ox, ymin.min(oy), xmax, oy.max(ymin))
    }

    /// The (col, row) of the pixel containing the world coordinate, or
    /// `None` when it falls outside the grid.
    pub fn pixel_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (ox, oy) = self.origin();
        let (pw, ph) = self.pixel_size();
        let col = (x - ox) / pw;
        let row = (oy - y) / ph.abs();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        if col >= self.width || row >= self.height {
            return None;
        }
        Some((col, row))
    }

    /// World coordinate of a pixel centre.
    pub fn centre_of(&self, col: usize, row: usize) -> (f64, f64) {
        let (ox, oy) = self.origin();
        let (pw, ph) = self.pixel_size();
        (
            ox + (col as f64 + 0.5) * pw,
            oy - (row as f64 + 0.5) * ph.abs(),
        )
    }

    /// Whether two grids are co-registered: same geotransform, projection,
    /// dimensions, and no-data value.
    pub fn matches(&self, other: &GridInfo) -> bool {
        const TOL: f64 = 1e-9;
        self.width == other.width
            && self.height == other.height
            && self.projection == other.projection
            && self.no_data == other.no_data
            && self
                .geo_transform
                .iter()
                .zip(other.geo_transform.iter())
                .all(|(a, b)| (a - b).abs() < TOL)
    }
}

/// Open an existing raster, mapping a missing path to a typed error.
pub fn open(path: &Path) -> Result<Dataset> {
    if !path.exists() {
        return Err(Error::MissingFile(path.to_path_buf()));
    }
    Ok(Dataset::open(path)?)
}

/// Create a new single-band Float32 raster on the given grid. The band's
/// no-data value is taken from the grid when present.
pub fn create_grid(path: &Path, grid: &GridInfo, format: OutputFormat) -> Result<Dataset> {
    let driver = DriverManager::get_driver_by_name(format.driver_name())?;
    let mut dataset = driver.create_with_band_type_with_options::<f32, _>(
        path,
        grid.width,
        grid.height,
        1,
        &format.creation_options(),
    )?;
    dataset.set_geo_transform(&grid.geo_transform)?;
    dataset.set_projection(&grid.projection)?;
    if let Some(no_data) = grid.no_data {
        dataset.rasterband(1)?.set_no_data_value(Some(no_data))?;
    }
    Ok(dataset)
}

/// Read one window of band 1 as a (rows, cols) array of f64.
pub fn read_window(dataset: &Dataset, window: BlockWindow) -> Result<Array2<f64>> {
    let band = dataset.rasterband(1)?;
    let buffer = band.read_as::<f64>(
        (window.x, window.y),
        (window.width, window.height),
        (window.width, window.height),
        None,
    )?;
    Ok(Array2::from_shape_vec(
        (window.height, window.width),
        buffer.data().to_vec(),
    )?)
}

/// Write one (rows, cols) window into band 1, converting to Float32.
pub fn write_window(dataset: &Dataset, window: BlockWindow, values: &Array2<f64>) -> Result<()> {
    let mut band = dataset.rasterband(1)?;
    let data: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    // Buffer shape is (cols, rows); the data stays row-major.
    let mut buffer = Buffer::new((window.width, window.height), data);
    band.write(
        (window.x, window.y),
        (window.width, window.height),
        &mut buffer,
    )?;
    Ok(())
}

/// Build the fixed overview pyramid on a dataset.
pub fn build_overviews(dataset: &mut Dataset) -> Result<()> {
    dataset.build_overviews(OVERVIEW_RESAMPLING, &OVERVIEW_LEVELS, &[])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_10x10() -> GridInfo {
        GridInfo {
            geo_transform: [500000.0, 10.0, 0.0, 4650000.0, 0.0, -10.0],
            projection: String::new(),
            width: 10,
            height: 10,
            no_data: Some(0.0),
        }
    }

    #[test]
    fn pixel_of_truncates_toward_zero() {
        let grid = grid_10x10();
        assert_eq!(grid.pixel_of(500000.0, 4650000.0), Some((0, 0)));
        assert_eq!(grid.pixel_of(500099.9, 4649900.1), Some((9, 9)));
        assert_eq!(grid.pixel_of(500055.0, 4649945.0), Some((5, 5)));
    }

    #[test]
    fn pixel_of_rejects_out_of_bounds() {
        let grid = grid_10x10();
        assert_eq!(grid.pixel_of(499999.9, 4650000.0), None);
        assert_eq!(grid.pixel_of(500100.0, 4650000.0), None);
        assert_eq!(grid.pixel_of(500000.0, 4649899.9), None);
    }

    #[test]
    fn centre_inverts_pixel_of() {
        let grid = grid_10x10();
        for (col, row) in [(0, 0), (3, 7), (9, 9)] {
            let (x, y) = grid.centre_of(col, row);
            assert_eq!(grid.pixel_of(x, y), Some((col, row)));
        }
    }

    #[test]
    fn bounds_span_the_grid() {
        let (xmin, ymin, xmax, ymax) = grid_10x10().bounds();
        assert_eq!((xmin, ymin, xmax, ymax), (500000.0, 4649900.0, 500100.0, 4650000.0));
    }
}
