//! Media Pipeline CLI
//!
//! Job management, headless, batch and benchmark runs over the processing pipeline.

use anyhow::{Context as _, Result};
use clap::Parser;
use media_pipeline_common::ErrorCode;
use media_pipeline_core::{Controller, LogLevel, ProcessConfig, ProcessorRegistry};
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod args;
mod commands;

use args::ProcessArgs;
use commands::Commands;

/// Executables every command shells out to
const REQUIRED_EXECUTABLES: [&str; 3] = ["curl", "ffmpeg", "ffprobe"];

#[derive(Parser, Debug)]
#[command(
    name = "media-pipeline",
    version,
    about = "Job based media processing gated by a content-safety check",
    after_help = "EXAMPLES:\n  \
                  media-pipeline headless-run -s face.png -t clip.mp4 -o out.mp4\n  \
                  media-pipeline job-create demo\n  \
                  media-pipeline job-add-step demo -t in.png -o out.png\n  \
                  media-pipeline job-submit demo && media-pipeline job-run demo\n  \
                  media-pipeline batch-run --target-pattern 'in/*.png' --output-pattern 'out/{index}{target_extension}'"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    process: ProcessArgs,
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ErrorCode::PreCheckFailed
        }
    };
    std::process::exit(code.code());
}

fn run() -> Result<ErrorCode> {
    let cli = Cli::parse();

    let mut config = ProcessConfig::load(cli.process.config_path.as_deref()).context("Failed to load configuration")?;
    config.apply_env().context("Invalid environment")?;
    cli.process.apply(&mut config);

    init_logging(config.log_level)?;

    let missing = missing_executables();
    if !missing.is_empty() {
        error!("Missing required executables: {}", missing.join(", "));
        return Ok(ErrorCode::PreCheckFailed);
    }

    let registry = ProcessorRegistry::new();
    config
        .validate(&registry.names())
        .context("Invalid configuration")?;

    let controller = Controller::from_config(config, registry);
    Ok(controller.route(cli.command.into_command()))
}

/// `RUST_LOG` wins over the configured level when set
fn init_logging(level: LogLevel) -> Result<()> {
    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let installed = match EnvFilter::try_from_default_env() {
        Ok(filter) => tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish()),
        Err(_) => tracing::subscriber::set_global_default(builder.with_max_level(level.level()).finish()),
    };
    installed.context("Failed to set tracing subscriber")
}

fn missing_executables() -> Vec<&'static str> {
    REQUIRED_EXECUTABLES
        .into_iter()
        .filter(|name| which::which(name).is_err())
        .collect()
}
