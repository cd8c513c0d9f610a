//! Command-line front end of the canopy engine.
//!
//! `canopy run` loads a configuration, a parameter table and a temperature
//! series (all TOML), simulates the configured dates and prints one line
//! per date. With `--out` it also writes the per-date summaries and the
//! scene of the last date as JSON.

use anyhow::{Context, Result};
use canopy_core::scene::scene_from_snapshot;
use canopy_core::snapshot::SnapshotSummary;
use canopy_core::{GenotypeParameters, ParameterTable, SimConfig, Simulation, TemperatureSeries};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::fs::File;
use std::ops::ControlFlow;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "canopy")]
#[command(about = "Simulate the architecture of a graminaceous crop canopy")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate the dates of a configuration
    Run {
        /// Run configuration (TOML)
        #[arg(long)]
        config: PathBuf,

        /// Genotype parameter table (TOML)
        #[arg(long)]
        params: PathBuf,

        /// Temperature series (TOML)
        #[arg(long)]
        weather: PathBuf,

        /// Output directory for summaries and the scene (optional)
        #[arg(long)]
        out: Option<PathBuf>,

        /// Include mirrored border plants in the scene
        #[arg(long)]
        mirrors: bool,
    },
    /// Dump the default configuration to stdout
    DumpDefaultConfig,
    /// Dump a single-row reference parameter table to stdout
    DumpDefaultParams {
        /// Genotype name of the row
        #[arg(long, default_value = "reference")]
        genotype: String,

        /// Sowing date of the row (YYYY-MM-DD)
        #[arg(long, default_value = "2010-10-15")]
        sowing_date: NaiveDate,
    },
}

fn run(
    config: PathBuf,
    params: PathBuf,
    weather: PathBuf,
    out: Option<PathBuf>,
    mirrors: bool,
) -> Result<()> {
    let sim_config = SimConfig::from_path(&config)
        .with_context(|| format!("failed to load config {}", config.display()))?;
    let table = ParameterTable::from_path(&params)
        .with_context(|| format!("failed to load parameter table {}", params.display()))?;
    let series = TemperatureSeries::from_path(&weather)
        .with_context(|| format!("failed to load temperature series {}", weather.display()))?;

    let mut sim =
        Simulation::new(sim_config, &table, &series).context("failed to set up the simulation")?;
    println!(
        "Simulating {} plants of {} over {} dates...",
        sim.plants().len(),
        sim.params().genotype,
        sim.config().date_sequence.len()
    );

    let mut summaries: Vec<SnapshotSummary> = Vec::new();
    let report = sim.run_with(|snapshot| {
        let summary = snapshot.summary();
        println!(
            "{}  tt={:7.1}  axes={:5} (living {:5})  haun={:5.2}  tips={:5.2}  lai={:6.3}",
            summary.date,
            summary.thermal_time,
            summary.axes,
            summary.living_axes,
            summary.main_stem_leaf_stage,
            summary.main_stem_visible_leaves,
            summary.leaf_area_index
        );
        summaries.push(summary);
        ControlFlow::Continue(())
    });

    if let Some(out_dir) = out {
        std::fs::create_dir_all(&out_dir).context("failed to create output directory")?;

        let summary_path = out_dir.join("summaries.json");
        let file = File::create(&summary_path).context("failed to create summary file")?;
        serde_json::to_writer_pretty(file, &summaries).context("failed to write summaries")?;

        if let Some(last) = report.last_snapshot() {
            let scene = scene_from_snapshot(last, mirrors);
            let scene_path = out_dir.join("scene.json");
            let file = File::create(&scene_path).context("failed to create scene file")?;
            serde_json::to_writer(file, &scene).context("failed to write scene")?;
            info!(
                shapes = scene.shapes.len(),
                triangles = scene.triangle_count(),
                path = %scene_path.display(),
                "scene written"
            );
        }
        println!("Results saved to {}", out_dir.display());
    }

    if let Some(failure) = report.failure {
        return Err(anyhow::Error::new(failure.error))
            .with_context(|| format!("simulation stopped at {}", failure.date));
    }
    Ok(())
}

fn main() -> Result<()> {
    // Default to INFO level if RUST_LOG is not set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::DumpDefaultConfig => {
            print!("{}", SimConfig::default().to_toml_string()?);
        }
        Commands::DumpDefaultParams {
            genotype,
            sowing_date,
        } => {
            let table = ParameterTable::new(vec![GenotypeParameters::reference(
                &genotype,
                sowing_date,
            )])?;
            print!("{}", table.to_toml_string()?);
        }
        Commands::Run {
            config,
            params,
            weather,
            out,
            mirrors,
        } => run(config, params, weather, out, mirrors)?,
    }
    Ok(())
}
