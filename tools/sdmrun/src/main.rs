//! Run a full species-distribution simulation from a JSON configuration
//! and an occurrence file, writing rasters, CSV reports, and charts into
//! the configured output directory.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

use nichemap_core::estimator::{GbtParams, MetaLearner, TreeEstimator};
use nichemap_core::raster::OutputFormat;
use nichemap_core::replicate::{run_meta_simulation, run_tree_simulation, RunOptions, Validation};
use nichemap_core::sample;
use nichemap_core::table::SampleTable;
use nichemap_core::vector::read_occurrences;
use nichemap_core::SimulationConfig;

#[derive(Parser, Debug)]
#[command(name = "sdmrun", about = "Replicated species-distribution simulation runner")]
struct Args {
    /// Simulation configuration JSON.
    #[arg(short, long)]
    config: PathBuf,

    /// Occurrence records: OGR point layer, or CSV with x/y columns.
    #[arg(short, long)]
    occurrences: PathBuf,

    /// Name of the x column for CSV occurrence files.
    #[arg(long, default_value = "x")]
    x_field: String,

    /// Name of the y column for CSV occurrence files.
    #[arg(long, default_value = "y")]
    y_field: String,

    /// Tree-ensemble estimator: decision-tree, random-forest, extra-trees,
    /// gradient-boosting, or adaboost.
    #[arg(short, long, default_value = "random-forest")]
    estimator: String,

    /// Fit the boosted-transform meta pipeline instead, with this
    /// meta-learner (maxent or mlp).
    #[arg(long)]
    meta: Option<String>,

    /// Number of pseudo-absence draws.
    #[arg(long, default_value = "10000")]
    pseudoabsences: usize,

    /// Drop pseudo-absences closer than this to any presence record
    /// (map units).
    #[arg(long)]
    min_distance: Option<f64>,

    /// Subsample absences down to the presence count.
    #[arg(long)]
    equalise: bool,

    #[arg(short, long, default_value = "10")]
    replicates: usize,

    /// Validation mode: split-sample[:fraction], bootstrap, or
    /// kfold[:folds].
    #[arg(short, long, default_value = "split-sample:0.1")]
    validation: String,

    /// Output raster format: gtiff or kea.
    #[arg(long, default_value = "gtiff")]
    format: String,

    #[arg(long, default_value = "42")]
    seed: u64,

    /// Remove and recreate the output directory first.
    #[arg(long)]
    overwrite: bool,

    /// Predict rasters in one whole-image read instead of native blocks.
    #[arg(long)]
    whole_image: bool,
}

fn parse_format(name: &str) -> Result<OutputFormat> {
    match name {
        "gtiff" => Ok(OutputFormat::GTiff),
        "kea" => Ok(OutputFormat::Kea),
        other => bail!("unknown raster format '{other}' (expected gtiff or kea)"),
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = SimulationConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.validate().context("validating the configuration")?;

    let presences = read_occurrences(&args.occurrences, &args.x_field, &args.y_field)
        .with_context(|| format!("reading {}", args.occurrences.display()))?;
    info!("{} presence records", presences.len());

    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut absences = sample::generate_pseudoabsences(&config, args.pseudoabsences, &mut rng)
        .context("generating pseudo-absences")?;
    if let Some(min_distance) = args.min_distance {
        absences = sample::drop_proximal_records(&absences, &presences, min_distance);
    }
    info!("{} pseudo-absence records", absences.len());

    let presence_table = sample::extract_raster_values(&config, &presences)
        .context("extracting presence records")?;
    let absence_table = sample::extract_raster_values(&config, &absences)
        .context("extracting pseudo-absence records")?;
    let presence_table = presence_table.with_label(&vec![1u8; presence_table.n_rows()])?;
    let absence_table = absence_table.with_label(&vec![0u8; absence_table.n_rows()])?;
    let mut table = SampleTable::concat(&[&presence_table, &absence_table])?;
    table = sample::drop_null_records(&table, config.no_data);
    if args.equalise {
        table = sample::equalise_records(&table, &mut rng)?;
    }
    info!("{} records after filtering", table.n_rows());

    let options = RunOptions {
        replicates: args.replicates,
        validation: Validation::parse(&args.validation)?,
        seed: args.seed,
        format: parse_format(&args.format)?,
        whole_image: args.whole_image,
        overwrite: args.overwrite,
        ..RunOptions::default()
    };

    let summary = match &args.meta {
        Some(meta) => {
            let meta = MetaLearner::parse(meta)?;
            run_meta_simulation(&config, &table, &GbtParams::default(), &meta, &options)?
        }
        None => {
            let estimator = TreeEstimator::parse(&args.estimator)?;
            run_tree_simulation(&config, &table, &estimator, &options)?
        }
    };

    println!("{} replicates complete", summary.replicates);
    for (name, score) in &summary.probability_scores {
        println!("{name:32} {score:.4}");
    }
    for (name, score) in &summary.binary_scores {
        println!("{name:32} {score:.4}");
    }
    if let Some(importances) = &summary.importances {
        println!("\nVariable importances (mean +/- std):");
        for (name, mean, std) in importances {
            println!("{name:24} {mean:.4} +/- {std:.4}");
        }
    }
    println!(
        "\nOutputs written to {}",
        config.output_dir.display()
    );
    Ok(())
}
