use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, error, info};
use us_reslice::{
    CancellationToken, DynVolume, RunConfig, RunReport, Scalar, SliceSequenceDriver, Volume,
    load_frame_series, load_transform_series, read_metaimage,
};

/// Reslice a CT/MRI volume along a tracked ultrasound sweep.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Run configuration (TOML).
    #[arg(short, long)]
    config: PathBuf,

    /// Override the output directory from the configuration.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log per-step details.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let mut config = RunConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    if let Some(output) = cli.output {
        config.output.dir = output;
    }

    let volume = read_metaimage(&config.input.volume)
        .with_context(|| format!("failed to read volume {}", config.input.volume.display()))?;
    info!(
        "loaded {} volume from {}",
        volume.element_type(),
        config.input.volume.display()
    );

    let report = match &volume {
        DynVolume::U8(v) => run(&config, v),
        DynVolume::I16(v) => run(&config, v),
        DynVolume::U16(v) => run(&config, v),
        DynVolume::F32(v) => run(&config, v),
    }?;

    for failure in &report.failures {
        error!(
            "step {} failed after {:?}: {}",
            failure.key, failure.state, failure.error
        );
    }
    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run<T: Scalar>(config: &RunConfig, volume: &Volume<T>) -> Result<RunReport> {
    let frames = load_frame_series(&config.input.frames).context("failed to index frames")?;
    let poses =
        load_transform_series(&config.input.transforms).context("failed to load transforms")?;
    let settings = config
        .driver_settings()
        .context("failed to prepare reslice settings")?;

    let driver = SliceSequenceDriver::new(volume, settings);
    let report = driver
        .run(&frames, &poses, &CancellationToken::new())
        .context("reslicing aborted")?;
    Ok(report)
}
