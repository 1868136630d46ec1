//! Tract backend: pure Rust ONNX inference with no native dependencies

use crate::error::{MatteError, Result};
use crate::inference::{BackendType, InferenceBackend};
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use ndarray::Array4;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

use instant::Instant;

/// Tract backend holding an optimized, runnable model
///
/// A runnable tract model is immutable, so concurrent `infer` calls need no locking.
#[derive(Debug)]
pub struct TractBackend {
    model: TractModel,
    info: ModelInfo,
    preprocessing: PreprocessingConfig,
}

impl TractBackend {
    /// Load, type and optimize the model described by `model_manager`
    ///
    /// The input fact is pinned to the model's fixed side so tract can
    /// optimize for a concrete shape.
    ///
    /// # Errors
    /// - Model file missing or failing its checksum
    /// - Tract rejects or cannot optimize the graph
    pub fn load(model_manager: &ModelManager) -> Result<Self> {
        let load_start = Instant::now();

        let model_data = model_manager.load_model()?;
        let info = model_manager.get_info()?;
        let preprocessing = model_manager.preprocessing_config();

        #[allow(clippy::cast_precision_loss)]
        let size_mb = info.size_bytes as f64 / (1024.0 * 1024.0);
        log::info!(
            "Initializing Tract backend: model {} ({:.2} MB, {}x{} input)",
            info.name,
            size_mb,
            info.input_size,
            info.input_size
        );

        let side = info.input_size as usize;
        let input_shape = preprocessing.layout.input_shape(side);

        let model = onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| MatteError::model(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact(input_shape).into())
            .map_err(|e| MatteError::model(format!("Failed to set input shape: {e}")))?
            .into_optimized()
            .map_err(|e| MatteError::model(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| MatteError::model(format!("Failed to create runnable model: {e}")))?;

        log::info!(
            "Tract backend initialized in {}ms",
            load_start.elapsed().as_millis()
        );

        Ok(Self {
            model,
            info,
            preprocessing,
        })
    }
}

impl InferenceBackend for TractBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        log::debug!("Running Tract inference on {:?}", input.shape());
        let inference_start = Instant::now();

        let input_tensor = Tensor::from(input.clone());
        let outputs = self
            .model
            .run(tvec![input_tensor.into()])
            .map_err(|e| MatteError::inference(format!("Tract inference failed: {e}")))?;

        // Multi-output models (U2Net's side outputs) put the fused map first
        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| MatteError::inference("No output tensor found"))?
            .into_arc_tensor();

        let output_data = output_tensor.to_array_view::<f32>().map_err(|e| {
            MatteError::inference(format!("Failed to convert output tensor: {e}"))
        })?;

        let shape = output_data.shape().to_vec();
        let [n, c, h, w] = shape[..] else {
            return Err(MatteError::inference(format!(
                "Expected 4D output tensor, got {}D",
                shape.len()
            )));
        };

        let output_array = Array4::from_shape_vec(
            (n, c, h, w),
            output_data.to_owned().into_raw_vec_and_offset().0,
        )
        .map_err(|e| MatteError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Tract inference completed in {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            output_array.shape()
        );

        Ok(output_array)
    }

    fn model_info(&self) -> &ModelInfo {
        &self.info
    }

    fn preprocessing_config(&self) -> PreprocessingConfig {
        self.preprocessing.clone()
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Tract
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelSpec;

    #[test]
    fn test_load_rejects_garbage_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.onnx");
        std::fs::write(&path, b"definitely not protobuf").unwrap();

        let manager = ModelManager::from_spec(&ModelSpec::default().with_path(&path)).unwrap();
        let err = TractBackend::load(&manager).unwrap_err();
        assert!(matches!(err, MatteError::Model(_)));
    }

    #[test]
    fn test_load_reports_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            ModelManager::from_spec(&ModelSpec::default().with_path(dir.path().join("none.onnx")))
                .unwrap();
        let err = TractBackend::load(&manager).unwrap_err();
        assert!(err.to_string().contains("file not found"));
    }
}
