//! Predictor grid alignment: detection of rasters that disagree with the
//! reference mask grid, and in-place resampling onto that grid.
//!
//! Resampling overwrites the input path after moving the original to a
//! `<stem>_original.<ext>` backup next to it.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use ndarray::Array2;

use crate::error::{Error, Result};

use super::{block_windows, create_grid, GridInfo, OutputFormat};

/// How source pixels are sampled onto the reference grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleMethod {
    Nearest,
    Bilinear,
}

impl ResampleMethod {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "nearest" => Ok(ResampleMethod::Nearest),
            "bilinear" => Ok(ResampleMethod::Bilinear),
            other => Err(Error::config(format!("unknown resample method '{other}'"))),
        }
    }
}

/// Return the subset of `rasters` whose geotransform, projection,
/// dimensions, or no-data value differ from the reference raster's.
pub fn find_misaligned(rasters: &[PathBuf], reference: &Path) -> Result<Vec<PathBuf>> {
    let target = GridInfo::read(reference)?;
    let mut misaligned = Vec::new();
    for path in rasters {
        let grid = GridInfo::read(path)?;
        if !grid.matches(&target) {
            misaligned.push(path.clone());
        }
    }
    Ok(misaligned)
}

/// Resample each raster onto the reference grid in place.
///
/// The original file is kept as `<stem>_original.<ext>`; re-running on an
/// already-backed-up raster refuses rather than clobbering the backup.
pub fn resample_to_grid(
    rasters: &[PathBuf],
    reference: &Path,
    method: ResampleMethod,
    format: OutputFormat,
) -> Result<()> {
    let target = GridInfo::read(reference)?;
    for path in rasters {
        let backup = backup_path(path)?;
        if backup.exists() {
            return Err(Error::config(format!(
                "backup {} already exists; refusing to overwrite it",
                backup.display()
            )));
        }
        info!(
            "resampling {} onto the grid of {}",
            path.display(),
            reference.display()
        );
        fs::rename(path, &backup)?;
        if let Err(err) = resample_one(&backup, path, &target, method, format) {
            // Put the original back so a failed run leaves the inputs usable.
            let _ = fs::rename(&backup, path);
            return Err(err);
        }
    }
    Ok(())
}

fn backup_path(path: &Path) -> Result<PathBuf> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::config(format!("unusable raster path {}", path.display())))?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("tif");
    Ok(path.with_file_name(format!("{stem}_original.{ext}")))
}

fn resample_one(
    source_path: &Path,
    dest_path: &Path,
    target: &GridInfo,
    method: ResampleMethod,
    format: OutputFormat,
) -> Result<()> {
    let source_ds = super::open(source_path)?;
    let source_grid = GridInfo::from_dataset(&source_ds)?;
    if source_grid.projection != target.projection {
        warn!(
            "{} projection differs from the reference; pixels are sampled by shared coordinates",
            source_path.display()
        );
    }
    let source = super::read_window(
        &source_ds,
        super::BlockWindow {
            x: 0,
            y: 0,
            width: source_grid.width,
            height: source_grid.height,
        },
    )?;
    let fill = target.no_data.unwrap_or(0.0);

    let mut dest_ds = create_grid(dest_path, target, format)?;
    for window in block_windows((target.width, target.height), (target.width, 128)) {
        let mut block = Array2::from_elem((window.height, window.width), fill);
        for row in 0..window.height {
            for col in 0..window.width {
                let (x, y) = target.centre_of(
                    window.x as usize + col,
                    window.y as usize + row,
                );
                if let Some(v) = sample(&source, &source_grid, x, y, method) {
                    block[[row, col]] = v;
                }
            }
        }
        super::write_window(&dest_ds, window, &block)?;
    }
    super::build_overviews(&mut dest_ds)?;
    Ok(())
}

/// Sample a source raster at a world coordinate.
fn sample(
    data: &Array2<f64>,
    grid: &GridInfo,
    x: f64,
    y: f64,
    method: ResampleMethod,
) -> Option<f64> {
    match method {
        ResampleMethod::Nearest => {
            let (col, row) = grid.pixel_of(x, y)?;
            Some(data[[row, col]])
        }
        ResampleMethod::Bilinear => {
            let (ox, oy) = grid.origin();
            let (pw, ph) = grid.pixel_size();
            // Fractional position relative to pixel centres.
            let fx = (x - ox) / pw - 0.5;
            let fy = (oy - y) / ph.abs() - 0.5;
            if fx < 0.0 || fy < 0.0 {
                return None;
            }
            let col0 = fx.floor() as usize;
            let row0 = fy.floor() as usize;
            if col0 >= grid.width || row0 >= grid.height {
                return None;
            }
            let col1 = (col0 + 1).min(grid.width - 1);
            let row1 = (row0 + 1).min(grid.height - 1);
            let tx = fx - col0 as f64;
            let ty = fy - row0 as f64;
            let v00 = data[[row0, col0]];
            let v10 = data[[row0, col1]];
            let v01 = data[[row1, col0]];
            let v11 = data[[row1, col1]];
            Some(
                v00 * (1.0 - tx) * (1.0 - ty)
                    + v10 * tx * (1.0 - ty)
                    + v01 * (1.0 - tx) * ty
                    + v11 * tx * ty,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_grid(width: usize, height: usize) -> GridInfo {
        GridInfo {
            geo_transform: [0.0, 1.0, 0.0, height as f64, 0.0, -1.0],
            projection: String::new(),
            width,
            height,
            no_data: None,
        }
    }

    #[test]
    fn nearest_sampling_picks_containing_pixel() {
        let grid = unit_grid(2, 2);
        let data = Array2::from_shape_vec((2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(sample(&data, &grid, 0.4, 1.6, ResampleMethod::Nearest), Some(1.0));
        assert_eq!(sample(&data, &grid, 1.6, 0.2, ResampleMethod::Nearest), Some(4.0));
        assert_eq!(sample(&data, &grid, 2.5, 0.5, ResampleMethod::Nearest), None);
    }

    #[test]
    fn bilinear_sampling_interpolates_between_centres() {
        let grid = unit_grid(2, 1);
        let data = Array2::from_shape_vec((1, 2), vec![0.0, 10.0]).unwrap();
        // Halfway between the two pixel centres.
        let v = sample(&data, &grid, 1.0, 0.5, ResampleMethod::Bilinear).unwrap();
        assert!((v - 5.0).abs() < 1e-12);
    }

    #[test]
    fn backup_path_appends_original_suffix() {
        let backup = backup_path(Path::new("/data/elevation.tif")).unwrap();
        assert_eq!(backup, PathBuf::from("/data/elevation_original.tif"));
    }
}
