//! Model file resolution, integrity checks and model metadata

use crate::error::{MatteError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Where the matting model lives
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSource {
    /// `<user cache dir>/postermaker/models/u2net.onnx`
    #[default]
    Default,
    /// External model from filesystem path
    External(PathBuf),
}

impl ModelSource {
    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            ModelSource::Default => "default:u2net".to_string(),
            ModelSource::External(path) => format!(
                "external:{}",
                path.file_name().unwrap_or_default().to_string_lossy()
            ),
        }
    }
}

/// Memory layout of the model's image input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum TensorLayout {
    /// `[1, 3, S, S]`, the usual ONNX export layout
    #[default]
    Nchw,
    /// `[1, S, S, 3]`, the TensorFlow export layout
    Nhwc,
}

impl TensorLayout {
    /// Input tensor shape for a square input of side `size`
    #[must_use]
    pub fn input_shape(self, size: usize) -> [usize; 4] {
        match self {
            Self::Nchw => [1, 3, size, size],
            Self::Nhwc => [1, size, size, 3],
        }
    }
}

/// Model specification: source plus the model's fixed input geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSpec {
    pub source: ModelSource,
    /// Side length S of the square model input and output
    pub input_size: u32,
    pub layout: TensorLayout,
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
    /// Expected SHA-256 of the model file, lowercase hex
    pub sha256: Option<String>,
}

impl ModelSpec {
    pub const DEFAULT_INPUT_SIZE: u32 = 320;

    /// Same geometry, model loaded from `path`
    #[must_use]
    pub fn with_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.source = ModelSource::External(path.into());
        self
    }

    /// Validate geometry, normalization and checksum format
    ///
    /// # Errors
    /// Returns `MatteError::InvalidConfig` for any invalid field
    pub fn validate(&self) -> Result<()> {
        if !(8..=4096).contains(&self.input_size) {
            return Err(MatteError::config_value_error(
                "input_size",
                self.input_size,
                "8-4096",
                Some(Self::DEFAULT_INPUT_SIZE),
            ));
        }
        if self
            .normalization_std
            .iter()
            .any(|s| !s.is_finite() || *s == 0.0)
        {
            return Err(MatteError::invalid_config(
                "normalization_std values must be finite and non-zero",
            ));
        }
        if let Some(ref digest) = self.sha256 {
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(MatteError::invalid_config(format!(
                    "sha256 must be 64 hex characters, got '{}'",
                    digest
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn preprocessing_config(&self) -> PreprocessingConfig {
        PreprocessingConfig {
            input_size: self.input_size,
            layout: self.layout,
            normalization_mean: self.normalization_mean,
            normalization_std: self.normalization_std,
        }
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        // Plain [0, 1] RGB scaling, as the original U2Net deployment fed it
        Self {
            source: ModelSource::Default,
            input_size: Self::DEFAULT_INPUT_SIZE,
            layout: TensorLayout::Nchw,
            normalization_mean: [0.0, 0.0, 0.0],
            normalization_std: [1.0, 1.0, 1.0],
            sha256: None,
        }
    }
}

/// Model preprocessing configuration
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessingConfig {
    pub input_size: u32,
    pub layout: TensorLayout,
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

/// Model information and metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub name: String,
    pub size_bytes: usize,
    /// Side length S of the probability grid the model produces
    pub input_size: u32,
    pub layout: TensorLayout,
}

/// Resolves a `ModelSpec` to a file and loads it
#[derive(Debug, Clone)]
pub struct ModelManager {
    spec: ModelSpec,
    path: PathBuf,
}

impl ModelManager {
    /// Create a manager for the given specification
    ///
    /// # Errors
    /// - No user cache directory for the default model location
    pub fn from_spec(spec: &ModelSpec) -> Result<Self> {
        let path = Self::resolve_path(&spec.source)?;
        Ok(Self {
            spec: spec.clone(),
            path,
        })
    }

    /// Location of the default model
    ///
    /// # Errors
    /// - The platform has no user cache directory
    pub fn default_model_path() -> Result<PathBuf> {
        dirs::cache_dir()
            .map(|dir| dir.join("postermaker").join("models").join("u2net.onnx"))
            .ok_or_else(|| MatteError::model("Could not determine the user cache directory"))
    }

    fn resolve_path(source: &ModelSource) -> Result<PathBuf> {
        match source {
            ModelSource::Default => Self::default_model_path(),
            ModelSource::External(path) => Ok(path.clone()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Read the model file, verifying its checksum when one is configured
    ///
    /// # Errors
    /// - Model file missing or unreadable
    /// - SHA-256 mismatch
    pub fn load_model(&self) -> Result<Vec<u8>> {
        if !self.path.exists() {
            return Err(MatteError::model_error_with_context(
                "load",
                &self.path,
                "file not found",
                &[
                    "export U2Net to ONNX and place it at this path",
                    "point POSTERMAKER_MODEL at an existing model file",
                ],
            ));
        }

        let data = fs::read(&self.path)
            .map_err(|e| MatteError::file_io_error("read model", &self.path, &e))?;

        if let Some(ref expected) = self.spec.sha256 {
            let actual = sha256_hex(&data);
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(MatteError::model_error_with_context(
                    "verify",
                    &self.path,
                    &format!("checksum mismatch (expected {}, got {})", expected, actual),
                    &["re-export or re-download the model"],
                ));
            }
            log::debug!("Model checksum verified: {}", actual);
        }

        Ok(data)
    }

    /// Get model information
    ///
    /// # Errors
    /// - Model file metadata unavailable
    pub fn get_info(&self) -> Result<ModelInfo> {
        let size_bytes = fs::metadata(&self.path)
            .map_err(|e| MatteError::file_io_error("inspect model", &self.path, &e))?
            .len() as usize;

        Ok(ModelInfo {
            name: self.model_name(),
            size_bytes,
            input_size: self.spec.input_size,
            layout: self.spec.layout,
        })
    }

    #[must_use]
    pub fn model_name(&self) -> String {
        self.path
            .file_stem()
            .map_or_else(|| "model".to_string(), |s| s.to_string_lossy().into_owned())
    }

    #[must_use]
    pub fn preprocessing_config(&self) -> PreprocessingConfig {
        self.spec.preprocessing_config()
    }
}

/// Lowercase hex SHA-256 of `data`
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
