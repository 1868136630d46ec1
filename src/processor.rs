//! Matting pipeline: model output to cutout
//!
//! [`MatteProcessor::process`] is the pure post-processing path used when a
//! probability grid is already at hand. [`MatteProcessor::run`] adds
//! preprocessing and inference around it, and
//! [`MatteProcessor::remove_background`] adds decoding and the shared model
//! for async callers.

use crate::{
    compositor,
    config::MatteConfig,
    error::{MatteError, Result},
    inference::InferenceBackend,
    matte::{normalize_contrast, EdgeCenterCorrector, OrientationCorrector, OrientationDecision, PassthroughCorrector},
    services::ImageIOService,
    shared_model::SharedModel,
    types::{CompositeResult, NormalizedMatte, ProbabilityGrid, ProcessingTimings, RemovalResult},
    utils::ImagePreprocessor,
};
use image::DynamicImage;
use instant::Instant;
use std::sync::Arc;
use tracing::{debug, info, instrument, span, Level};

/// Runs orientation correction, normalization and compositing
#[derive(Debug, Clone)]
pub struct MatteProcessor {
    config: MatteConfig,
    corrector: Arc<dyn OrientationCorrector>,
}

impl MatteProcessor {
    /// Processor with the corrector selected by `config.orientation_correction`
    #[must_use]
    pub fn new(config: MatteConfig) -> Self {
        let corrector: Arc<dyn OrientationCorrector> = if config.orientation_correction {
            Arc::new(EdgeCenterCorrector::new(config.orientation))
        } else {
            Arc::new(PassthroughCorrector::new(config.orientation))
        };
        Self { config, corrector }
    }

    /// Replace the orientation strategy
    #[must_use]
    pub fn with_corrector(mut self, corrector: Arc<dyn OrientationCorrector>) -> Self {
        self.corrector = corrector;
        self
    }

    #[must_use]
    pub fn config(&self) -> &MatteConfig {
        &self.config
    }

    #[must_use]
    pub fn corrector(&self) -> &dyn OrientationCorrector {
        self.corrector.as_ref()
    }

    /// Correct polarity, then normalize contrast
    #[must_use]
    pub fn postprocess(&self, raw: ProbabilityGrid) -> (NormalizedMatte, OrientationDecision) {
        let (corrected, decision) = self.corrector.correct(raw);
        (normalize_contrast(&corrected), decision)
    }

    /// Cutout of `source` from a raw probability grid
    #[must_use]
    pub fn process(&self, raw: ProbabilityGrid, source: &DynamicImage) -> CompositeResult {
        let (matte, _) = self.postprocess(raw);
        compositor::composite_with_filter(source, &matte, self.config.resample_filter)
    }

    /// Run the whole local pipeline on a decoded image
    ///
    /// # Errors
    /// - Preprocessing failure (empty image)
    /// - Inference failure
    /// - Model output that is not a single-channel square map
    #[instrument(
        skip(self, backend, source),
        fields(
            model = %backend.model_info().name,
            backend = %backend.backend_type(),
            dimensions = %format!("{}x{}", source.width(), source.height())
        )
    )]
    pub fn run(&self, backend: &dyn InferenceBackend, source: &DynamicImage) -> Result<RemovalResult> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        let input_tensor = {
            let _span = span!(Level::DEBUG, "preprocessing").entered();
            let start = Instant::now();
            let tensor =
                ImagePreprocessor::preprocess_for_inference(source, &backend.preprocessing_config())?;
            timings.preprocessing_ms = start.elapsed().as_millis() as u64;
            tensor
        };

        let output_tensor = {
            let _span = span!(Level::INFO, "inference").entered();
            let start = Instant::now();
            let output = backend.infer(&input_tensor)?;
            timings.inference_ms = start.elapsed().as_millis() as u64;
            output
        };

        let (composite, matte, orientation) = {
            let _span = span!(Level::DEBUG, "postprocessing").entered();
            let start = Instant::now();
            let grid = ProbabilityGrid::from_tensor(&output_tensor)?;
            let (matte, orientation) = self.postprocess(grid);
            let composite =
                compositor::composite_with_filter(source, &matte, self.config.resample_filter);
            timings.postprocessing_ms = start.elapsed().as_millis() as u64;
            (composite, matte, orientation)
        };

        timings.total_ms = total_start.elapsed().as_millis() as u64;

        debug!(
            inverted = orientation.inverted,
            foreground_ratio = matte.statistics().foreground_ratio,
            "matte ready"
        );
        info!(timings = %timings.summary(), "cutout complete");

        Ok(RemovalResult {
            composite,
            matte,
            orientation,
            timings,
            model_name: backend.model_info().name.clone(),
            processed_at: chrono::Utc::now(),
        })
    }

    /// Decode an upload and run the pipeline with the shared model
    ///
    /// CPU-bound work runs on the blocking thread pool.
    ///
    /// # Errors
    /// - `MatteError::Decode` for undecodable uploads
    /// - Model loading failures
    /// - Any pipeline failure from [`MatteProcessor::run`]
    pub async fn remove_background(&self, model: &SharedModel, bytes: &[u8]) -> Result<RemovalResult> {
        let backend = model.get().await?;
        let processor = self.clone();
        let bytes = bytes.to_vec();

        tokio::task::spawn_blocking(move || {
            let decode_start = Instant::now();
            let source = ImageIOService::decode_bytes(&bytes)?;
            let decode_ms = decode_start.elapsed().as_millis() as u64;

            let mut result = processor.run(backend.as_ref(), &source)?;
            result.timings.decode_ms = decode_ms;
            result.timings.total_ms += decode_ms;
            Ok(result)
        })
        .await
        .map_err(|e| MatteError::internal(format!("processing task failed: {}", e)))?
    }
}

impl Default for MatteProcessor {
    fn default() -> Self {
        Self::new(MatteConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockBackend, MockPattern};
    use crate::config::OrientationThresholds;
    use image::{Rgb, RgbImage};

    fn source(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([120, 80, 40])))
    }

    #[test]
    fn test_run_with_inverted_model() {
        let backend = MockBackend::new(32, MockPattern::InvertedDisc);
        let processor = MatteProcessor::default();

        let result = processor.run(&backend, &source(64, 48)).unwrap();
        assert!(result.orientation.inverted);
        assert_eq!(result.dimensions(), (64, 48));
        assert_eq!(result.model_name, "mock");

        let image = result.composite.image();
        assert!(image.get_pixel(32, 24)[3] > 200);
        assert!(image.get_pixel(0, 0)[3] < 50);
    }

    #[test]
    fn test_passthrough_keeps_inverted_output() {
        let backend = MockBackend::new(32, MockPattern::InvertedDisc);
        let config = MatteConfig {
            orientation_correction: false,
            ..MatteConfig::default()
        };
        let processor = MatteProcessor::new(config);
        assert_eq!(processor.corrector().name(), "passthrough");

        let result = processor.run(&backend, &source(32, 32)).unwrap();
        assert!(!result.orientation.inverted);
        assert!(result.composite.image().get_pixel(16, 16)[3] < 50);
    }

    #[test]
    fn test_passthrough_reports_configured_region_means() {
        let backend = MockBackend::new(32, MockPattern::InvertedDisc);
        let orientation = OrientationThresholds {
            center_start: 0.4,
            center_end: 0.6,
            ..OrientationThresholds::default()
        };
        let correcting = MatteConfig {
            orientation,
            ..MatteConfig::default()
        };
        let passthrough = MatteConfig {
            orientation_correction: false,
            ..correcting.clone()
        };

        let measured = MatteProcessor::new(correcting).run(&backend, &source(32, 32)).unwrap();
        let kept = MatteProcessor::new(passthrough).run(&backend, &source(32, 32)).unwrap();
        let default_kept = MatteProcessor::new(MatteConfig {
            orientation_correction: false,
            ..MatteConfig::default()
        })
        .run(&backend, &source(32, 32))
        .unwrap();

        assert!(measured.orientation.inverted);
        assert!(!kept.orientation.inverted);
        assert_eq!(kept.orientation.edge_mean, measured.orientation.edge_mean);
        assert_eq!(kept.orientation.center_mean, measured.orientation.center_mean);
        assert!(kept.orientation.center_mean < default_kept.orientation.center_mean);
    }

    #[test]
    fn test_inference_failure_propagates() {
        let processor = MatteProcessor::default();
        let err = processor
            .run(&MockBackend::failing(16), &source(8, 8))
            .unwrap_err();
        assert!(matches!(err, MatteError::Inference(_)));
    }

    #[tokio::test]
    async fn test_remove_background_rejects_garbage() {
        let model = SharedModel::preloaded(Arc::new(MockBackend::new(16, MockPattern::CenteredDisc)));
        let err = MatteProcessor::default()
            .remove_background(&model, b"not an image")
            .await
            .unwrap_err();
        assert!(matches!(err, MatteError::Decode(_)));
    }
}
