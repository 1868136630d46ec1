//! Inference backend abstraction and backend construction

use crate::{
    config::MatteConfig,
    error::{MatteError, Result},
    models::{ModelInfo, ModelManager, PreprocessingConfig},
};
use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// Inference engine used to execute the matting model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum BackendType {
    /// Pure Rust inference
    Tract,
    /// ONNX Runtime with optional hardware acceleration
    Onnx,
}

impl Default for BackendType {
    fn default() -> Self {
        if cfg!(feature = "tract") {
            Self::Tract
        } else {
            Self::Onnx
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tract => write!(f, "tract"),
            Self::Onnx => write!(f, "onnx"),
        }
    }
}

/// A loaded model that can be shared between concurrent requests
///
/// Implementations are constructed fully initialized; a backend that exists
/// is ready for inference.
pub trait InferenceBackend: Send + Sync {
    /// Run the model on a preprocessed `[1, 3, S, S]` (or NHWC) tensor
    ///
    /// # Errors
    /// - Model inference failures
    /// - Output tensor conversion errors
    fn infer(&self, input: &Array4<f32>) -> Result<Array4<f32>>;

    fn model_info(&self) -> &ModelInfo;

    /// How input images must be turned into tensors for this model
    fn preprocessing_config(&self) -> PreprocessingConfig;

    fn backend_type(&self) -> BackendType;
}

/// Constructs backends; the seam tests use to substitute a mock model
pub trait BackendFactory: Send + Sync {
    /// Load the model and build a backend of the requested type
    ///
    /// # Errors
    /// - Backend type not compiled in
    /// - Model missing, corrupt or rejected by the engine
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
        config: &MatteConfig,
    ) -> Result<Box<dyn InferenceBackend>>;

    /// Backend types this factory can build
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the backends compiled into this build
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(
        &self,
        backend_type: BackendType,
        model_manager: ModelManager,
        config: &MatteConfig,
    ) -> Result<Box<dyn InferenceBackend>> {
        match backend_type {
            #[cfg(feature = "tract")]
            BackendType::Tract => {
                let _ = config;
                Ok(Box::new(crate::backends::TractBackend::load(&model_manager)?))
            },
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(crate::backends::OnnxBackend::load(
                &model_manager,
                config,
            )?)),
            #[allow(unreachable_patterns)]
            other => {
                let _ = (model_manager, config);
                Err(MatteError::invalid_config(format!(
                    "Backend '{}' is not compiled into this build (enable the '{}' feature)",
                    other, other
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        backends
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelSpec;

    #[test]
    fn test_default_backend_is_available() {
        let factory = DefaultBackendFactory;
        let available = factory.available_backends();
        assert!(available.contains(&BackendType::default()) || available.is_empty());
    }

    #[test]
    fn test_backend_type_serde() {
        assert_eq!(
            serde_json::to_string(&BackendType::Tract).unwrap(),
            "\"tract\""
        );
        let parsed: BackendType = serde_json::from_str("\"onnx\"").unwrap();
        assert_eq!(parsed, BackendType::Onnx);
        assert_eq!(BackendType::Onnx.to_string(), "onnx");
    }

    #[test]
    fn test_missing_model_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ModelSpec::default().with_path(dir.path().join("absent.onnx"));
        let manager = ModelManager::from_spec(&spec).unwrap();

        let result = DefaultBackendFactory.create_backend(
            BackendType::default(),
            manager,
            &MatteConfig::default(),
        );
        assert!(result.is_err());
    }
}
