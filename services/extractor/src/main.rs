//! ERA5-Land feature extractor CLI.
//!
//! Runs one extraction end to end:
//! - Reads points or polygons from GeoJSON
//! - Submits and polls a Climate Data Store job
//! - Downloads and decodes the NetCDF result
//! - Writes CSV, GeoTIFF or GeoJSON outputs

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use era5_common::time::{parse_date, parse_hours};
use era5_common::VariableCodeMapper;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use extractor::config::default_cdsapirc_path;
use extractor::{
    input, CdsProvider, ExtractorConfig, JobOutcome, LoggingObserver, NetCdfDecoder,
    Orchestrator, PolygonOutput, RequestBuilder,
};

#[derive(Parser, Debug)]
#[command(name = "extractor")]
#[command(about = "Extract ERA5-Land reanalysis data for points and polygons")]
struct Args {
    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one extraction
    Run(RunArgs),
    /// List the available variables
    Variables,
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// GeoJSON file with points or polygons
    #[arg(short, long)]
    input: PathBuf,

    /// First day (YYYY-MM-DD)
    #[arg(long)]
    start: String,

    /// Last day, inclusive (YYYY-MM-DD)
    #[arg(long)]
    end: String,

    /// Hours of day, e.g. "0,6,12,18" or "00:00,12:00"
    #[arg(long, default_value = "0")]
    hours: String,

    /// Variables by name, comma separated
    #[arg(long = "vars", value_delimiter = ',', required = true)]
    variables: Vec<String>,

    /// Output directory
    #[arg(short, long, default_value = "out")]
    out: PathBuf,

    /// Output for polygon inputs
    #[arg(long, value_enum, default_value = "raster")]
    output_format: OutputFormat,

    /// YAML configuration file
    #[arg(long, env = "ERA5_CONFIG")]
    config: Option<PathBuf>,

    /// Scratch directory for downloads
    #[arg(long, env = "ERA5_WORK_DIR")]
    work_dir: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Raster,
    Vector,
}

impl From<OutputFormat> for PolygonOutput {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Raster => PolygonOutput::Raster,
            OutputFormat::Vector => PolygonOutput::Vector,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Variables => {
            for spec in VariableCodeMapper::era5_land().all() {
                println!("{:<40} {:<8} {}", spec.display_name, spec.internal_code, spec.unit);
            }
            Ok(())
        }
        Command::Run(run) => run_extraction(run).await,
    }
}

async fn run_extraction(args: RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ExtractorConfig::load(path)?,
        None => ExtractorConfig::default(),
    };
    config.apply_env();
    if let Some(work_dir) = &args.work_dir {
        config.work_dir = work_dir.clone();
    }
    if let Some(rc) = default_cdsapirc_path() {
        config.apply_cdsapirc(&rc)?;
    }
    config.validate().map_err(|e| anyhow!("Invalid configuration: {}", e))?;

    let start = parse_date(&args.start)?;
    let end = parse_date(&args.end)?;
    let hours = parse_hours(&args.hours)?;
    let features = input::load_features(&args.input)
        .with_context(|| format!("Failed to read features from {}", args.input.display()))?;

    let descriptor = RequestBuilder::new()
        .variables(args.variables.iter().map(String::as_str))
        .hours(hours)
        .date_range(start, end)
        .features(features)
        .polygon_output(args.output_format.into())
        .build()?;

    info!(
        features = descriptor.features.len(),
        variables = descriptor.variables.len(),
        start = %start,
        end = %end,
        "Starting extraction"
    );

    let provider = Arc::new(CdsProvider::new(config.provider.clone())?);
    let orchestrator = Arc::new(Orchestrator::new(
        &config,
        provider,
        Arc::new(NetCdfDecoder),
        Arc::new(LoggingObserver),
    ));
    let job_id = orchestrator.submit(descriptor);

    // Handle Ctrl+C
    let cancel_handle = orchestrator.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        cancel_handle.cancel(job_id);
    });

    match orchestrator.wait(job_id).await {
        Some(JobOutcome::Completed(output)) => {
            let paths = output.write_to(&args.out, start, end)?;
            for path in &paths {
                println!("{}", path.display());
            }
            info!(files = paths.len(), "Extraction complete");
            Ok(())
        }
        Some(JobOutcome::Failed { kind, message }) => bail!("Extraction failed ({}): {}", kind, message),
        Some(JobOutcome::Cancelled) => bail!("Extraction cancelled"),
        None => bail!("Job {} disappeared", job_id),
    }
}
