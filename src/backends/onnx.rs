//! ONNX Runtime backend with CPU, CUDA and `CoreML` execution providers

use crate::config::{ExecutionProvider, MatteConfig};
use crate::error::{MatteError, Result};
use crate::inference::{BackendType, InferenceBackend};
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
    ExecutionProviderDispatch,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::sync::Mutex;

/// ONNX Runtime backend
///
/// `Session::run` needs exclusive access, so concurrent requests serialize on the session.
#[derive(Debug)]
pub struct OnnxBackend {
    session: Mutex<Session>,
    info: ModelInfo,
    preprocessing: PreprocessingConfig,
}

impl OnnxBackend {
    /// List execution providers with availability status and descriptions
    #[must_use]
    pub fn list_providers() -> Vec<(String, bool, String)> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                cuda_available,
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                coreml_available,
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    /// Build a session for the model described by `model_manager`
    ///
    /// # Errors
    /// - Model file missing or failing its checksum
    /// - ONNX Runtime session creation failures
    pub fn load(model_manager: &ModelManager, config: &MatteConfig) -> Result<Self> {
        let load_start = std::time::Instant::now();

        let model_data = model_manager.load_model()?;
        let info = model_manager.get_info()?;

        let mut builder = Session::builder()
            .map_err(|e| MatteError::inference(format!("Failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                MatteError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        let providers = Self::select_providers(config.execution_provider);
        if providers.is_empty() {
            log::info!("Using CPU execution provider");
        } else {
            builder = builder.with_execution_providers(providers).map_err(|e| {
                MatteError::inference(format!("Failed to set execution providers: {e}"))
            })?;
        }

        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(4)
        };

        let session = builder
            .with_intra_threads(intra_threads)
            .map_err(|e| MatteError::inference(format!("Failed to set intra threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                MatteError::model(format!("Failed to create session from model data: {e}"))
            })?;

        log::info!(
            "ONNX Runtime backend ready: model {}, provider {}, {} intra-op threads, {:.0}ms",
            info.name,
            config.execution_provider,
            intra_threads,
            load_start.elapsed().as_secs_f64() * 1000.0
        );

        Ok(Self {
            session: Mutex::new(session),
            info,
            preprocessing: model_manager.preprocessing_config(),
        })
    }

    /// Providers to register ahead of the implicit CPU fallback
    fn select_providers(requested: ExecutionProvider) -> Vec<ExecutionProviderDispatch> {
        let cuda = || {
            let provider = CUDAExecutionProvider::default();
            OrtExecutionProvider::is_available(&provider)
                .unwrap_or(false)
                .then(|| provider.build())
        };
        let coreml = || {
            let provider = CoreMLExecutionProvider::default();
            OrtExecutionProvider::is_available(&provider)
                .unwrap_or(false)
                .then(|| CoreMLExecutionProvider::default().with_subgraphs(true).build())
        };

        match requested {
            ExecutionProvider::Cpu => Vec::new(),
            ExecutionProvider::Auto => [cuda(), coreml()].into_iter().flatten().collect(),
            ExecutionProvider::Cuda => cuda().map_or_else(
                || {
                    log::warn!("CUDA execution provider requested but not available, falling back to CPU");
                    Vec::new()
                },
                |p| vec![p],
            ),
            ExecutionProvider::CoreMl => coreml().map_or_else(
                || {
                    log::warn!("CoreML execution provider requested but not available, falling back to CPU");
                    Vec::new()
                },
                |p| vec![p],
            ),
        }
    }
}

impl InferenceBackend for OnnxBackend {
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let inference_start = std::time::Instant::now();

        let input_value = Value::from_array(input.clone())
            .map_err(|e| MatteError::inference(format!("Failed to convert input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| MatteError::internal("ONNX session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| MatteError::inference(format!("ONNX inference failed: {e}")))?;

        // Positional access; U2Net lists the fused map first
        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| MatteError::inference("No output tensors found"))?
            .to_string();
        let output_tensor = outputs
            .get(first_key.as_str())
            .ok_or_else(|| MatteError::inference("First output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| MatteError::inference(format!("Failed to extract output tensor: {e}")))?;

        let shape = output_tensor.shape().to_vec();
        let [n, c, h, w] = shape[..] else {
            return Err(MatteError::inference(format!(
                "Expected 4D output tensor, got {}D",
                shape.len()
            )));
        };

        let output_array = Array4::from_shape_vec(
            (n, c, h, w),
            output_tensor.view().to_owned().into_raw_vec_and_offset().0,
        )
        .map_err(|e| MatteError::inference(format!("Failed to reshape output tensor: {e}")))?;

        log::debug!(
            "ONNX inference completed in {:.2}ms, output {:?}",
            inference_start.elapsed().as_secs_f64() * 1000.0,
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
        BackendType::Onnx
    }
}
