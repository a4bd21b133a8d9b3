//! Block iteration over one or more co-registered rasters.
//!
//! Every tiled raster operation in the crate walks the same finite sequence
//! of rectangular windows produced here, instead of carrying its own nested
//! x/y loop. Windows at the right and bottom edges are clipped to the grid.

use std::path::{Path, PathBuf};

use gdal::Dataset;
use ndarray::{Array2, Axis};

use crate::error::{Error, Result};

use super::GridInfo;

/// One rectangular pixel window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    pub x: isize,
    pub y: isize,
    pub width: usize,
    pub height: usize,
}

impl BlockWindow {
    pub fn pixels(&self) -> usize {
        self.width * self.height
    }
}

/// Iterator over the clipped windows of a `raster_size` grid, traversed
/// row-major in `block_size` steps. Restartable by constructing it again.
#[derive(Debug, Clone)]
pub struct BlockWindows {
    raster_width: usize,
    raster_height: usize,
    block_width: usize,
    block_height: usize,
    next_x: usize,
    next_y: usize,
}

pub fn block_windows(raster_size: (usize, usize), block_size: (usize, usize)) -> BlockWindows {
    BlockWindows {
        raster_width: raster_size.0,
        raster_height: raster_size.1,
        block_width: block_size.0.max(1),
        block_height: block_size.1.max(1),
        next_x: 0,
        next_y: 0,
    }
}

impl Iterator for BlockWindows {
    type Item = BlockWindow;

    fn next(&mut self) -> Option<BlockWindow> {
        if self.next_y >= self.raster_height {
            return None;
        }
        let window = BlockWindow {
            x: self.next_x as isize,
            y: self.next_y as isize,
            width: self.block_width.min(self.raster_width - self.next_x),
            height: self.block_height.min(self.raster_height - self.next_y),
        };
        self.next_x += self.block_width;
        if self.next_x >= self.raster_width {
            self.next_x = 0;
            self.next_y += self.block_height;
        }
        Some(window)
    }
}

/// A stack of co-registered single-band rasters read together window by
/// window. Opening verifies that every member shares the first raster's
/// grid shape; projection and no-data checks belong to `align`.
pub struct RasterStack {
    paths: Vec<PathBuf>,
    datasets: Vec<Dataset>,
    grid: GridInfo,
}

impl RasterStack {
    pub fn open(paths: &[PathBuf]) -> Result<Self> {
        if paths.is_empty() {
            return Err(Error::data("raster stack needs at least one raster"));
        }
        let mut datasets = Vec::with_capacity(paths.len());
        for path in paths {
            datasets.push(super::open(path)?);
        }
        let grid = GridInfo::from_dataset(&datasets[0])?;
        for (dataset, path) in datasets.iter().zip(paths).skip(1) {
            let (width, height) = dataset.raster_size();
            if (width, height) != (grid.width, grid.height) {
                return Err(Error::data(format!(
                    "raster {} is {}x{}, expected {}x{}",
                    path.display(),
                    width,
                    height,
                    grid.width,
                    grid.height
                )));
            }
        }
        Ok(RasterStack {
            paths: paths.to_vec(),
            datasets,
            grid,
        })
    }

    pub fn grid(&self) -> &GridInfo {
        &self.grid
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Window sequence using the first band's native block size, or a
    /// single whole-image window.
    pub fn windows(&self, whole_image: bool) -> Result<BlockWindows> {
        let size = (self.grid.width, self.grid.height);
        if whole_image {
            return Ok(block_windows(size, size));
        }
        let block = self.datasets[0].rasterband(1)?.block_size();
        Ok(block_windows(size, block))
    }

    /// Read the same window from every member, one (rows, cols) array each.
    pub fn read_window(&self, window: BlockWindow) -> Result<Vec<Array2<f64>>> {
        self.datasets
            .iter()
            .map(|dataset| super::read_window(dataset, window))
            .collect()
    }

    /// Read a window from every member flattened into a feature matrix of
    /// shape (pixels, members), pixels in row-major window order.
    pub fn read_features(&self, window: BlockWindow) -> Result<Array2<f64>> {
        let mut features = Array2::zeros((window.pixels(), self.datasets.len()));
        for (index, block) in self.read_window(window)?.into_iter().enumerate() {
            let flat = block.into_shape_with_order(window.pixels())?;
            features.index_axis_mut(Axis(1), index).assign(&flat);
        }
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_cover_grid_without_overlap() {
        let windows: Vec<_> = block_windows((10, 7), (4, 3)).collect();
        let total: usize = windows.iter().map(BlockWindow::pixels).sum();
        assert_eq!(total, 70);
        // Edge windows are clipped.
        assert_eq!(windows[2], BlockWindow { x: 8, y: 0, width: 2, height: 3 });
        let last = windows.last().unwrap();
        assert_eq!(last.y + last.height as isize, 7);
    }

    #[test]
    fn whole_image_is_a_single_window() {
        let windows: Vec<_> = block_windows((64, 32), (64, 32)).collect();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].pixels(), 64 * 32);
    }

    #[test]
    fn iteration_is_restartable() {
        let first: Vec<_> = block_windows((10, 10), (3, 3)).collect();
        let second: Vec<_> = block_windows((10, 10), (3, 3)).collect();
        assert_eq!(first, second);
    }
}
