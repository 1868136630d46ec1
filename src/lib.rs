#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # PosterMaker
//!
//! Cutout service for a poster editor. An uploaded photo goes in, a PNG with
//! the background made transparent comes out.
//!
//! Cutouts are produced one of two ways:
//!
//! - **Local**: a U2Net-style salient object model runs in-process (Tract or
//!   ONNX Runtime). Its S×S probability map is polarity-corrected, contrast
//!   normalized, stretched to the source resolution and used as the alpha
//!   channel.
//! - **Proxy**: the upload is forwarded to remove.bg and its response relayed.
//!
//! ## Features
//!
//! - **Matte post-processing**: edge-versus-center orientation correction and
//!   min/max contrast normalization, usable on any probability grid
//! - **Multiple Backends**: Tract (pure Rust, default) and ONNX Runtime
//!   (`onnx` feature, CUDA/`CoreML` providers)
//! - **Shared model**: loaded once per process on first use, then shared
//!   read-only by concurrent requests
//! - **HTTP server** (`server` feature): `/healthz`, `/api/removebg` and the
//!   built single-page app
//! - **CLI** (`cli` feature): `serve`, `cutout` and `backends` commands
//!
//! ## Quick Start
//!
//! Post-processing a grid that is already at hand:
//!
//! ```rust
//! use image::{DynamicImage, RgbImage};
//! use postermaker::{process_matte, ProbabilityGrid};
//!
//! # fn main() -> postermaker::Result<()> {
//! // Inverted model output: high at the border, low in the middle
//! let grid = ProbabilityGrid::from_rows(&[
//!     [0.9, 0.9, 0.9, 0.9],
//!     [0.9, 0.1, 0.1, 0.9],
//!     [0.9, 0.1, 0.1, 0.9],
//!     [0.9, 0.9, 0.9, 0.9],
//! ])?;
//! let photo = DynamicImage::ImageRgb8(RgbImage::new(64, 48));
//!
//! let cutout = process_matte(grid, &photo);
//! assert_eq!(cutout.dimensions(), (64, 48));
//! # Ok(())
//! # }
//! ```
//!
//! Running the full local pipeline on an upload:
//!
//! ```rust,no_run
//! use postermaker::{remove_background_from_bytes, MatteConfig};
//!
//! # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
//! let config = MatteConfig::builder().build()?;
//! let result = remove_background_from_bytes(&upload, &config).await?;
//! result.composite.save_png("cutout.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): pure Rust backend
//! - `onnx`: ONNX Runtime backend with hardware acceleration
//! - `server` (default): axum HTTP server
//! - `cli` (default): command-line interface and tracing subscriber setup
//! - `tracing-json`: JSON log lines

pub mod backends;
#[cfg(feature = "cli")]
pub mod cli;
pub mod compositor;
pub mod config;
pub mod error;
pub mod inference;
pub mod matte;
pub mod models;
pub mod processor;
pub mod remover;
#[cfg(feature = "server")]
pub mod server;
pub mod services;
pub mod shared_model;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use std::sync::Arc;

// Public API exports
pub use backends::{MockBackend, MockBackendFactory, MockPattern};
#[cfg(feature = "onnx")]
pub use backends::OnnxBackend;
#[cfg(feature = "tract")]
pub use backends::TractBackend;
pub use compositor::{composite, composite_with_filter, resample_matte};
pub use config::{
    ExecutionProvider, MatteConfig, MatteConfigBuilder, OrientationThresholds, OutputFormat,
    RemovalMode, RemoveBgConfig, ResampleFilter, ServerConfig,
};
pub use error::{MatteError, Result};
pub use inference::{BackendFactory, BackendType, DefaultBackendFactory, InferenceBackend};
pub use matte::{
    correct_orientation, normalize_contrast, EdgeCenterCorrector, OrientationCorrector,
    OrientationDecision, PassthroughCorrector,
};
pub use models::{ModelInfo, ModelManager, ModelSource, ModelSpec, PreprocessingConfig, TensorLayout};
pub use processor::MatteProcessor;
pub use remover::{BackgroundRemover, LocalRemover, RemovalRequest, RemoteRemover};
pub use services::{ImageIOService, ImageUpload, OutputFormatHandler, RemoveBgClient, RemoveBgOptions};
pub use shared_model::SharedModel;
pub use types::{
    CompositeResult, MatteStatistics, NormalizedMatte, ProbabilityGrid, ProcessingTimings,
    RemovalResult,
};
pub use utils::ImagePreprocessor;

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, spans, TracingConfig, TracingFormat};

/// Cutout of `source` from a raw probability grid with default settings
///
/// Orientation correction, contrast normalization and compositing; no model
/// involved.
#[must_use]
pub fn process_matte(raw: ProbabilityGrid, source: &image::DynamicImage) -> CompositeResult {
    MatteProcessor::default().process(raw, source)
}

/// Remove the background from encoded image bytes with a freshly loaded model
///
/// Loads the model described by `config` for this call only. Long-running
/// callers should keep a [`SharedModel`] and use
/// [`MatteProcessor::remove_background`] instead.
///
/// # Errors
/// - `MatteError::Decode` for undecodable bytes
/// - Model loading and inference failures
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    config: &MatteConfig,
) -> Result<RemovalResult> {
    let model = SharedModel::new(config.clone(), Arc::new(DefaultBackendFactory));
    MatteProcessor::new(config.clone())
        .remove_background(&model, image_bytes)
        .await
}

/// Remove the background from an async reader stream
///
/// # Errors
/// - Read failures
/// - Any failure from [`remove_background_from_bytes`]
pub async fn remove_background_from_reader<R: tokio::io::AsyncRead + Unpin>(
    mut reader: R,
    config: &MatteConfig,
) -> Result<RemovalResult> {
    let mut buffer = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buffer)
        .await
        .map_err(|e| MatteError::processing(format!("Failed to read from stream: {}", e)))?;

    remove_background_from_bytes(&buffer, config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    #[test]
    fn test_process_matte_preserves_dimensions() {
        let grid = ProbabilityGrid::from_rows(&[
            [0.9, 0.9, 0.9, 0.9],
            [0.9, 0.1, 0.1, 0.9],
            [0.9, 0.1, 0.1, 0.9],
            [0.9, 0.9, 0.9, 0.9],
        ])
        .unwrap();
        let source = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 7, Rgb([1, 2, 3])));

        let cutout = process_matte(grid, &source);
        assert_eq!(cutout.dimensions(), (10, 7));
        assert_eq!(cutout.image().get_pixel(0, 0)[0], 1);
    }

    #[tokio::test]
    async fn test_reader_api_rejects_garbage() {
        let config = MatteConfig::builder()
            .model(ModelSpec::default().with_path("/nonexistent/u2net.onnx"))
            .build()
            .unwrap();
        let reader = std::io::Cursor::new(b"definitely not an image".to_vec());
        assert!(remove_background_from_reader(reader, &config).await.is_err());
    }
}
