//! This is the main entry point for the `whey-conda` binary.

use std::path::PathBuf;

use chrono::DateTime;
use clap::{Parser, crate_version};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use indicatif::MultiProgress;
use miette::IntoDiagnostic;
use tracing_subscriber::{fmt, prelude::*};
use whey_conda::{
    CondaBuilder, PipInstaller, PyProject, RepodataValidator, WheyWheelBuilder,
    console_utils::{IndicatifWriter, TracingFormatter, get_default_env_filter},
};
use whey_conda_package::PackageConfig;

/// Build a noarch python conda package for a project using the whey build backend.
#[derive(Parser)]
#[clap(version = crate_version!())]
struct App {
    /// The project to build. Defaults to the current directory.
    #[arg(default_value = ".")]
    project_dir: PathBuf,

    /// The output directory. Defaults to `<PROJECT_DIR>/dist`.
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// The build directory. Defaults to `<PROJECT_DIR>/build/conda`.
    #[arg(short, long)]
    build_dir: Option<PathBuf>,

    /// The build number of the conda package.
    #[arg(long, default_value_t = 1)]
    build_number: u64,

    /// The Python interpreter used to run whey.
    #[arg(long, default_value = "python3")]
    python: PathBuf,

    /// The pip executable used to install the wheel.
    #[arg(long, default_value = "pip")]
    pip: PathBuf,

    /// Do not check that the requirements are available from the conda channels.
    #[arg(long)]
    skip_channel_check: bool,

    /// Use this time (seconds since the epoch) in the package instead of the current time.
    #[arg(long, env = "SOURCE_DATE_EPOCH")]
    source_date_epoch: Option<i64>,

    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

fn main() -> miette::Result<()> {
    let args = App::parse();

    let multi_progress = MultiProgress::new();

    // Setup tracing subscriber
    tracing_subscriber::registry()
        .with(get_default_env_filter(args.verbose.log_level_filter()).into_diagnostic()?)
        .with(
            fmt::layer()
                .with_writer(IndicatifWriter::new(multi_progress.clone()))
                .event_format(TracingFormatter),
        )
        .init();

    let timestamp = args
        .source_date_epoch
        .map(|seconds| {
            DateTime::from_timestamp(seconds, 0)
                .ok_or_else(|| miette::miette!("timestamp {seconds} is out of range"))
        })
        .transpose()?;

    let project_dir = fs_err::canonicalize(&args.project_dir).into_diagnostic()?;
    let pyproject = PyProject::from_dir(&project_dir)?;
    let project = pyproject.project_config(&project_dir)?;
    let conda = pyproject.conda_config(&project)?;

    tracing::debug!("Building {} {}", project.name, project.version);

    let mut wheel_builder =
        WheyWheelBuilder::new(project_dir.clone(), project, multi_progress.clone())
            .with_python(args.python);
    if let Some(build_dir) = args.build_dir {
        wheel_builder = wheel_builder.with_build_dir(build_dir);
    }
    if let Some(out_dir) = args.out_dir {
        wheel_builder = wheel_builder.with_out_dir(out_dir);
    }

    let installer = PipInstaller::new(args.pip, multi_progress.clone());

    let mut builder = CondaBuilder::new(Box::new(wheel_builder), Box::new(installer), conda)
        .with_build_number(args.build_number)
        .with_package_config(PackageConfig {
            timestamp,
            ..Default::default()
        });
    if !args.skip_channel_check {
        builder = builder.with_channel_validator(Box::new(RepodataValidator::new(
            project_dir,
            multi_progress,
        )));
    }

    builder.build_conda()?;

    Ok(())
}
