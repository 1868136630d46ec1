//! PosterMaker CLI
//!
//! Runs the cutout server or processes single files with the local model.

use super::config::CliConfigBuilder;
use crate::{
    config::{OutputFormat, RemovalMode, ResampleFilter},
    inference::{BackendFactory, BackendType, DefaultBackendFactory},
    models::ModelManager,
    processor::MatteProcessor,
    services::{ImageIOService, OutputFormatHandler},
    tracing_config::{init_cli_tracing, spans, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// Background removal for the poster editor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "postermaker")]
pub struct Cli {
    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format
    #[arg(long, value_enum, default_value_t = TracingFormat::Console, global = true)]
    pub log_format: TracingFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve /healthz, /api/removebg and the built UI
    Serve(ServeArgs),
    /// Cut out the subject of one image with the local model
    Cutout(CutoutArgs),
    /// List inference backends compiled into this build
    Backends,
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// JSON configuration file; environment variables and flags override it
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// Produce cutouts locally or through remove.bg
    #[arg(long, value_enum)]
    pub mode: Option<RemovalMode>,

    /// Path to the U2Net ONNX model
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Directory with the built single-page app
    #[arg(long, value_name = "DIR")]
    pub static_dir: Option<PathBuf>,

    /// Upload limit in megabytes
    #[arg(long, value_name = "N")]
    pub max_upload_mb: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CutoutArgs {
    /// Input image
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output file [default: <stem>_cutout.<ext>]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Path to the U2Net ONNX model
    #[arg(long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub backend: Option<BackendType>,

    /// Model input side length
    #[arg(long, value_name = "S")]
    pub input_size: Option<u32>,

    /// Filter used to stretch the matte to the image size
    #[arg(long, value_enum, default_value_t = ResampleFilter::Bilinear)]
    pub filter: ResampleFilter,

    /// Keep the model output polarity as is
    #[arg(long)]
    pub no_orientation_fix: bool,

    /// Also write the cutout's alpha channel as a grayscale PNG
    #[arg(long, value_name = "PATH")]
    pub mask: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Png)]
    pub format: OutputFormat,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_cli_tracing(cli.verbose, cli.log_format).context("Failed to initialize tracing")?;

    match cli.command {
        Command::Serve(args) => serve(&args).await,
        Command::Cutout(args) => cutout(&args).await,
        Command::Backends => {
            list_backends();
            Ok(())
        },
    }
}

async fn serve(args: &ServeArgs) -> Result<()> {
    let config = CliConfigBuilder::server_config(args).context("Invalid server configuration")?;
    log::info!(
        "Starting PosterMaker on {}:{} in {:?} mode",
        config.host,
        config.port,
        config.mode()
    );
    crate::server::serve(config).await.context("Server failed")?;
    Ok(())
}

async fn cutout(args: &CutoutArgs) -> Result<()> {
    let config = CliConfigBuilder::matte_config(args).context("Invalid cutout options")?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input, args.format));

    let input = args.input.clone();
    let mask = args.mask.clone();
    let format = args.format;
    let output_path = output.clone();

    // Model loading and inference are CPU-bound
    let result = tokio::task::spawn_blocking(move || -> Result<_> {
        let _span = spans::file_processing(&input).entered();

        let model_manager = ModelManager::from_spec(&config.model)?;
        let backend = DefaultBackendFactory
            .create_backend(config.backend_type, model_manager, &config)
            .context("Failed to load model")?;

        let source = ImageIOService::load_image(&input)
            .with_context(|| format!("Failed to read {}", input.display()))?;
        let result = MatteProcessor::new(config).run(backend.as_ref(), &source)?;

        ImageIOService::save_image(&result.composite, &output_path, format)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        if let Some(mask) = &mask {
            result
                .composite
                .save_alpha_mask(mask)
                .with_context(|| format!("Failed to write {}", mask.display()))?;
        }
        Ok(result)
    })
    .await
    .context("Cutout task panicked")??;

    let (width, height) = result.dimensions();
    log::info!(
        "Wrote {}x{} cutout to {} ({}){}",
        width,
        height,
        output.display(),
        result.timings.summary(),
        if result.orientation.inverted { ", model output inverted" } else { "" }
    );
    Ok(())
}

fn list_backends() {
    let available = DefaultBackendFactory.available_backends();
    for backend in [BackendType::Tract, BackendType::Onnx] {
        let marker = if available.contains(&backend) { "available" } else { "not compiled in" };
        println!("{:<6} {}", backend.to_string(), marker);
    }

    #[cfg(feature = "onnx")]
    for (name, available, description) in crate::backends::OnnxBackend::list_providers() {
        println!(
            "  onnx:{:<8} {:<13} {}",
            name,
            if available { "available" } else { "unavailable" },
            description
        );
    }
}

/// `<dir>/<stem>_cutout.<ext>` next to the input
pub(crate) fn default_output_path(input: &Path, format: OutputFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "image".into(), |s| s.to_string_lossy());
    input.with_file_name(format!(
        "{}_cutout.{}",
        stem,
        OutputFormatHandler::extension(format)
    ))
}
