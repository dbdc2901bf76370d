//! CLI entry point for scandaq.
//!
//! Three modes:
//! - `scan`: run a full scan against the configured hardware (`--mock`
//!   wires the simulated stage and digitizer).
//! - `convert`: run the conversion and post-processing stages over an
//!   existing raw trace directory, without hardware.
//! - `pattern`: print the traversal order a scan configuration produces,
//!   for dry-checking a geometry before committing beam time to it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use scandaq::config::Config;
use scandaq::hardware::mock::{MockDigitizer, MockStage};
use scandaq::hardware::{Digitizer, MotionStage};
use scandaq::pipeline::runner::{convert_directory, ScanRunner};
use scandaq::scan::{coord_from_index, GridExtents, ScanPattern};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "scandaq")]
#[command(about = "Scanning acquisition with a concurrent conversion pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full scan: motion, acquisition, conversion, post-processing
    Scan {
        /// TOML configuration file
        #[arg(long, default_value = "scandaq.toml")]
        config: PathBuf,

        /// Use simulated hardware instead of real instruments
        #[arg(long)]
        mock: bool,
    },

    /// Convert an existing raw trace directory offline
    Convert {
        /// Directory holding C{ch}--Trace{n}.trc files
        #[arg(long)]
        raw_dir: PathBuf,

        /// Output directory for converted/ and processed/ subdirectories
        #[arg(long)]
        out_dir: PathBuf,

        /// Restrict conversion to a scan-index range, e.g. 1..200
        #[arg(long, value_parser = parse_scan_range)]
        scans: Option<std::ops::RangeInclusive<u32>>,

        /// TOML configuration file (pipeline and post-processing sections)
        #[arg(long, default_value = "scandaq.toml")]
        config: PathBuf,
    },

    /// Print the grid traversal order for a pattern and extents
    Pattern {
        pattern: ScanPattern,

        #[arg(long, default_value_t = 1)]
        nx: u32,
        #[arg(long, default_value_t = 1)]
        ny: u32,
        #[arg(long, default_value_t = 1)]
        nz: u32,

        /// Step sizes in micrometers, as x,y,z
        #[arg(long, value_delimiter = ',', num_args = 3, default_values_t = [100.0, 0.0, 0.0])]
        step: Vec<f64>,

        /// Home position in micrometers, as x,y,z
        #[arg(long, value_delimiter = ',', num_args = 3, default_values_t = [0.0, 0.0, 0.0])]
        home: Vec<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { config, mock } => run_scan(config, mock).await,
        Commands::Convert {
            raw_dir,
            out_dir,
            scans,
            config,
        } => run_convert(raw_dir, out_dir, scans, config).await,
        Commands::Pattern {
            pattern,
            nx,
            ny,
            nz,
            step,
            home,
        } => print_pattern(pattern, nx, ny, nz, &step, &home),
    }
}

async fn run_scan(config_path: PathBuf, mock: bool) -> Result<()> {
    let config = load_config(&config_path)?;
    scandaq::logging::init(&config.run.log_level)?;

    let (stage, digitizer): (Arc<dyn MotionStage>, Arc<dyn Digitizer>) = if mock {
        (Arc::new(MockStage::new()), Arc::new(MockDigitizer::new()))
    } else {
        // Real stage/digitizer backends are deployment-specific drivers
        // registered at integration time; this binary ships only the
        // simulated pair.
        bail!("no real hardware backend is linked into this build; use --mock");
    };

    let paths = ScanRunner::new(config, stage, digitizer).run().await?;
    println!("run written to {}", paths.root.display());
    Ok(())
}

async fn run_convert(
    raw_dir: PathBuf,
    out_dir: PathBuf,
    scans: Option<std::ops::RangeInclusive<u32>>,
    config_path: PathBuf,
) -> Result<()> {
    let mut config = if config_path.exists() {
        Config::load_from(&config_path)
            .with_context(|| format!("failed to load configuration from {}", config_path.display()))?
    } else {
        Config::default()
    };
    // Offline conversion is useful even when no analysis tool is
    // configured; fall back to the pass-through processor.
    if config.postprocess.executable.as_os_str().is_empty() {
        config.postprocess.enabled = false;
    }
    config
        .validate()
        .map_err(scandaq::error::DaqError::Configuration)?;
    scandaq::logging::init(&config.run.log_level)?;

    let converted = convert_directory(&config, &raw_dir, &out_dir, scans).await?;
    println!(
        "{converted} scan(s) converted into {}",
        out_dir.display()
    );
    Ok(())
}

fn print_pattern(
    pattern: ScanPattern,
    nx: u32,
    ny: u32,
    nz: u32,
    step: &[f64],
    home: &[f64],
) -> Result<()> {
    let extents = GridExtents::new(nx, ny, nz);
    if extents.is_empty() {
        bail!("extents ({nx}, {ny}, {nz}) cover zero grid points");
    }
    let steps = [step[0], step[1], step[2]];
    let origin = [home[0], home[1], home[2]];

    println!("# {pattern:?} over {nx}x{ny}x{nz} ({} points)", extents.len());
    println!("# step ix iy iz x_um y_um z_um");
    for (n, index) in pattern.indices(extents).enumerate() {
        let [x, y, z] = coord_from_index(index, steps, origin);
        println!(
            "{} {} {} {} {x:.3} {y:.3} {z:.3}",
            n + 1,
            index.ix,
            index.iy,
            index.iz
        );
    }
    Ok(())
}

fn parse_scan_range(s: &str) -> Result<std::ops::RangeInclusive<u32>, String> {
    let (lo, hi) = s
        .split_once("..")
        .ok_or_else(|| format!("expected a..b, got '{s}'"))?;
    let lo: u32 = lo.trim().parse().map_err(|e| format!("bad start: {e}"))?;
    let hi: u32 = hi.trim().parse().map_err(|e| format!("bad end: {e}"))?;
    if lo > hi {
        return Err(format!("empty range {lo}..{hi}"));
    }
    Ok(lo..=hi)
}

fn load_config(path: &PathBuf) -> Result<Config> {
    let config = Config::load_from(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    config
        .validate()
        .map_err(scandaq::error::DaqError::Configuration)?;
    Ok(config)
}
