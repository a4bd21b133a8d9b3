//! Report predictor rasters that disagree with the mask grid, and
//! optionally resample them onto it in place.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use nichemap_core::raster::align::{find_misaligned, resample_to_grid, ResampleMethod};
use nichemap_core::raster::OutputFormat;
use nichemap_core::SimulationConfig;

#[derive(Parser, Debug)]
#[command(name = "gridcheck", about = "Check predictor rasters against the mask grid")]
struct Args {
    /// Simulation configuration JSON.
    #[arg(short, long)]
    config: PathBuf,

    /// Resample misaligned rasters onto the mask grid (keeps an
    /// `_original` backup of each).
    #[arg(long)]
    fix: bool,

    /// Resample method when fixing: nearest or bilinear.
    #[arg(short, long, default_value = "nearest")]
    method: String,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = SimulationConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.validate().context("validating the configuration")?;

    let misaligned = find_misaligned(&config.predictors, &config.mask)?;
    if misaligned.is_empty() {
        println!("all {} predictors share the mask grid", config.predictors.len());
        return Ok(());
    }
    for path in &misaligned {
        println!("misaligned: {}", path.display());
    }
    if args.fix {
        let method = ResampleMethod::parse(&args.method)?;
        resample_to_grid(&misaligned, &config.mask, method, OutputFormat::GTiff)?;
        println!("resampled {} raster(s) onto the mask grid", misaligned.len());
    }
    Ok(())
}
