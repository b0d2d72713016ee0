//! tmask CLI - fit harmonic reflectance models and write cloud masks

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tmask::config::{TmaskConfig, TmaskPaths};
use tmask::core::{run_classification, run_diagnostics, run_fit, RobustMethod};
use tmask::types::ThresholdMode;

#[derive(Parser)]
#[command(name = "tmask")]
#[command(author, version, about = "Time-series cloud and shadow masking", long_about = None)]
struct Cli {
    /// Data root holding toar_images/, coeffs/, results/ and plots/ (default: $HOME/data)
    #[arg(short, long, global = true)]
    data_root: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit the harmonic model to every pixel and persist the coefficients
    Fit {
        #[command(flatten)]
        fit: FitArgs,
    },
    /// Predict every date and write _pred and _cloud rasters
    Classify {
        #[command(flatten)]
        classify: ClassifyArgs,
    },
    /// Export corner-pixel model curves as CSV
    Diagnostics,
    /// Fit, export diagnostics and classify in one go
    Run {
        #[command(flatten)]
        fit: FitArgs,
        #[command(flatten)]
        classify: ClassifyArgs,
    },
}

#[derive(clap::Args)]
struct FitArgs {
    /// Use the quality masks to exclude cloud pixels from training
    #[arg(long)]
    use_quality_mask: bool,

    /// Weighting function: bisquare, cauchy, fair, huber, welsch or ols
    #[arg(long, default_value = "bisquare")]
    method: String,
}

#[derive(clap::Args)]
struct ClassifyArgs {
    /// Use per-pixel RMSE thresholds instead of the static one
    #[arg(long)]
    dynamic_threshold: bool,

    /// Static residual threshold in reflectance units
    #[arg(long, default_value = "0.04")]
    static_threshold: f32,
}

fn data_root(cli: &Cli) -> Result<PathBuf> {
    if let Some(root) = &cli.data_root {
        return Ok(root.clone());
    }
    let home = std::env::var("HOME").context("HOME is not set; pass --data-root")?;
    Ok(Path::new(&home).join("data"))
}

fn fit(config: &TmaskConfig) -> Result<()> {
    let start = Instant::now();
    let summary = run_fit(config).context("Failed to fit the time series")?;
    println!(
        "Fitted {} dates over {}x{} pixels in {:.2?}",
        summary.num_dates,
        summary.width,
        summary.height,
        start.elapsed()
    );
    for (band, undefined) in summary.undefined_pixels.iter().enumerate() {
        if *undefined > 0 {
            println!("  band {}: {} pixels without a model", band + 1, undefined);
        }
    }
    Ok(())
}

fn diagnostics(config: &TmaskConfig) -> Result<()> {
    let written = run_diagnostics(config).context("Failed to export diagnostics")?;
    for path in written {
        println!("  {}", path.display());
    }
    Ok(())
}

fn classify(config: &TmaskConfig) -> Result<()> {
    let start = Instant::now();
    let reports = run_classification(config).context("Failed to create cloud masks")?;
    for report in reports.iter().filter(|r| r.mask.is_some()) {
        println!(
            "  {}: {} cloud, {} shadow pixels",
            report.image.display(),
            report.cloud_pixels,
            report.shadow_pixels
        );
    }
    println!("Classified {} scenes in {:.2?}", reports.len(), start.elapsed());
    Ok(())
}

fn apply_fit_args(config: TmaskConfig, args: &FitArgs) -> Result<TmaskConfig> {
    let method: RobustMethod = args.method.parse()?;
    let mut config = config.with_quality_mask(args.use_quality_mask);
    config.method = method;
    Ok(config)
}

fn apply_classify_args(config: TmaskConfig, args: &ClassifyArgs) -> TmaskConfig {
    let mode = if args.dynamic_threshold {
        ThresholdMode::Dynamic
    } else {
        ThresholdMode::Static
    };
    let mut config = config.with_threshold_mode(mode);
    config.static_threshold = args.static_threshold;
    config
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = TmaskConfig::new(TmaskPaths::from_data_root(data_root(&cli)?));

    match &cli.command {
        Commands::Fit { fit: args } => fit(&apply_fit_args(config, args)?),
        Commands::Classify { classify: args } => classify(&apply_classify_args(config, args)),
        Commands::Diagnostics => diagnostics(&config),
        Commands::Run {
            fit: fit_args,
            classify: classify_args,
        } => {
            let config = apply_classify_args(apply_fit_args(config, fit_args)?, classify_args);
            fit(&config)?;
            diagnostics(&config)?;
            classify(&config)
        }
    }
}
