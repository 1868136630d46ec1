//! Configuration types for matting, the removal services and the HTTP server

use crate::error::{MatteError, Result};
use crate::inference::BackendType;
use crate::models::ModelSpec;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Output encodings for cutouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum OutputFormat {
    /// PNG with alpha channel transparency
    #[default]
    Png,
    /// TIFF with alpha channel transparency and lossless compression
    Tiff,
    /// Raw RGBA8 pixel data (4 bytes per pixel)
    Rgba8,
}

/// Interpolation used when the S×S matte is stretched to the source resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum ResampleFilter {
    /// Nearest neighbour; shows blocking at low model resolutions
    Nearest,
    /// Linear interpolation between the four closest cells
    #[default]
    Bilinear,
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResampleFilter> for image::imageops::FilterType {
    fn from(filter: ResampleFilter) -> Self {
        match filter {
            ResampleFilter::Nearest => Self::Nearest,
            ResampleFilter::Bilinear => Self::Triangle,
            ResampleFilter::CatmullRom => Self::CatmullRom,
            ResampleFilter::Gaussian => Self::Gaussian,
            ResampleFilter::Lanczos3 => Self::Lanczos3,
        }
    }
}

/// Region thresholds for the edge-versus-center inversion heuristic
///
/// The defaults are empirical and have never been validated against ground
/// truth. They are kept as named constants so deployments can override them
/// instead of re-deriving new ones.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationThresholds {
    /// Width of the edge band as a fraction of the grid side
    pub border_fraction: f32,
    /// Lower bound on the edge band width, in cells
    pub min_border: usize,
    /// Start of the center box on both axes, as a fraction of the side
    pub center_start: f32,
    /// End (exclusive) of the center box on both axes, as a fraction of the side
    pub center_end: f32,
}

impl OrientationThresholds {
    pub const DEFAULT_BORDER_FRACTION: f32 = 0.05;
    pub const DEFAULT_MIN_BORDER: usize = 2;
    pub const DEFAULT_CENTER_START: f32 = 0.25;
    pub const DEFAULT_CENTER_END: f32 = 0.75;

    /// Edge band width for a grid of the given side: `max(min_border, floor(fraction * side))`
    #[must_use]
    pub fn border_width(&self, side: usize) -> usize {
        let scaled = (side as f64 * f64::from(self.border_fraction)).floor() as usize;
        scaled.max(self.min_border)
    }

    /// Center box index range, applied to both axes
    #[must_use]
    pub fn center_range(&self, side: usize) -> Range<usize> {
        let start = (side as f64 * f64::from(self.center_start)).floor() as usize;
        let end = (side as f64 * f64::from(self.center_end)).floor() as usize;
        start.min(side)..end.min(side)
    }

    /// Validate the thresholds
    ///
    /// # Errors
    /// - Border fraction outside `[0, 0.5)`
    /// - Center box bounds outside `[0, 1]` or not increasing
    pub fn validate(&self) -> Result<()> {
        if !(0.0..0.5).contains(&self.border_fraction) {
            return Err(MatteError::config_value_error(
                "border_fraction",
                self.border_fraction,
                "0.0-0.5 (exclusive)",
                Some(Self::DEFAULT_BORDER_FRACTION),
            ));
        }
        if !(0.0..=1.0).contains(&self.center_start) || !(0.0..=1.0).contains(&self.center_end) {
            return Err(MatteError::invalid_config(format!(
                "Center box bounds must lie in 0.0-1.0, got {}..{}",
                self.center_start, self.center_end
            )));
        }
        if self.center_start >= self.center_end {
            return Err(MatteError::invalid_config(format!(
                "Center box start ({}) must be below its end ({})",
                self.center_start, self.center_end
            )));
        }
        Ok(())
    }
}

impl Default for OrientationThresholds {
    fn default() -> Self {
        Self {
            border_fraction: Self::DEFAULT_BORDER_FRACTION,
            min_border: Self::DEFAULT_MIN_BORDER,
            center_start: Self::DEFAULT_CENTER_START,
            center_end: Self::DEFAULT_CENTER_END,
        }
    }
}

/// Configuration for the local matting pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatteConfig {
    /// Model file and its fixed input geometry
    pub model: ModelSpec,

    /// Inference engine used to run the model
    pub backend_type: BackendType,

    /// Execution provider (ONNX Runtime only)
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Thresholds for the inversion heuristic
    pub orientation: OrientationThresholds,

    /// Whether the inversion heuristic runs at all
    pub orientation_correction: bool,

    /// Matte upsampling filter
    pub resample_filter: ResampleFilter,

    /// Encoding of the cutout
    pub output_format: OutputFormat,
}

impl Default for MatteConfig {
    fn default() -> Self {
        Self {
            model: ModelSpec::default(),
            backend_type: BackendType::default(),
            execution_provider: ExecutionProvider::Auto,
            intra_threads: 0,
            orientation: OrientationThresholds::default(),
            orientation_correction: true,
            resample_filter: ResampleFilter::Bilinear,
            output_format: OutputFormat::Png,
        }
    }
}

impl MatteConfig {
    #[must_use]
    pub fn builder() -> MatteConfigBuilder {
        MatteConfigBuilder::new()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - Invalid orientation thresholds
    /// - Invalid model geometry or normalization
    pub fn validate(&self) -> Result<()> {
        self.orientation.validate()?;
        self.model.validate()?;
        Ok(())
    }
}

/// Builder for `MatteConfig`
#[derive(Debug, Default)]
pub struct MatteConfigBuilder {
    config: MatteConfig,
}

impl MatteConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: MatteConfig::default(),
        }
    }

    #[must_use]
    pub fn model(mut self, model: ModelSpec) -> Self {
        self.config.model = model;
        self
    }

    #[must_use]
    pub fn backend_type(mut self, backend_type: BackendType) -> Self {
        self.config.backend_type = backend_type;
        self
    }

    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn orientation(mut self, thresholds: OrientationThresholds) -> Self {
        self.config.orientation = thresholds;
        self
    }

    #[must_use]
    pub fn orientation_correction(mut self, enabled: bool) -> Self {
        self.config.orientation_correction = enabled;
        self
    }

    #[must_use]
    pub fn resample_filter(mut self, filter: ResampleFilter) -> Self {
        self.config.resample_filter = filter;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// Returns `MatteError::InvalidConfig` when validation fails
    pub fn build(self) -> Result<MatteConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// How `/api/removebg` produces cutouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum RemovalMode {
    /// Run the matting model in-process
    #[default]
    Local,
    /// Forward uploads to remove.bg
    Proxy,
}

impl std::str::FromStr for RemovalMode {
    type Err = MatteError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "proxy" | "remote" => Ok(Self::Proxy),
            other => Err(MatteError::invalid_config(format!(
                "Unknown removal mode '{}'. Expected 'local' or 'proxy'",
                other
            ))),
        }
    }
}

/// Settings for the remove.bg client
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoveBgConfig {
    /// API key sent as `X-Api-Key`; requests fail without it
    pub api_key: Option<String>,
    pub endpoint: String,
    pub timeout_secs: u64,
    /// `size` form field used when the client does not send one
    pub default_size: String,
    /// `format` form field used when the client does not send one
    pub default_format: String,
}

impl RemoveBgConfig {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.remove.bg/v1.0/removebg";

    /// Configured key, ignoring blank values
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.trim().is_empty())
    }

    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key().is_some()
    }
}

impl Default for RemoveBgConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: Self::DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 60,
            default_size: "auto".to_string(),
            default_format: "png".to_string(),
        }
    }
}

impl std::fmt::Debug for RemoveBgConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoveBgConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .field("default_size", &self.default_size)
            .field("default_format", &self.default_format)
            .finish()
    }
}

/// Configuration for the HTTP server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Explicit removal mode; `mode()` resolves it when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<RemovalMode>,
    /// Largest accepted upload, in bytes
    pub max_upload_bytes: usize,
    /// Built UI assets served for every other path
    pub static_dir: Option<PathBuf>,
    pub matte: MatteConfig,
    pub remove_bg: RemoveBgConfig,
}

impl ServerConfig {
    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

    /// Load configuration from a JSON file; missing fields take their defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - File is not valid JSON for this structure
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| MatteError::file_io_error("read config file", path, &e))?;
        serde_json::from_str(&content).map_err(|e| {
            MatteError::invalid_config(format!("Failed to parse '{}': {}", path.display(), e))
        })
    }

    /// Default configuration overlaid with the process environment
    ///
    /// # Errors
    /// Returns `MatteError::InvalidConfig` for malformed variables
    pub fn from_env() -> Result<Self> {
        Self::default().apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay environment-style variables obtained from `lookup`
    ///
    /// Recognized keys: `PORT`, `REMOVE_BG_API_KEY`, `POSTERMAKER_MODE`,
    /// `POSTERMAKER_MODEL`, `POSTERMAKER_STATIC_DIR`. `POSTERMAKER_MODE`
    /// replaces any mode already set; an API key alone never changes it.
    ///
    /// # Errors
    /// Returns `MatteError::InvalidConfig` for malformed variables
    pub fn apply_env_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.port = port.trim().parse().map_err(|_| {
                MatteError::config_value_error("PORT", port.as_str(), "1-65535", None)
            })?;
        }

        if let Some(key) = lookup("REMOVE_BG_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.remove_bg.api_key = Some(key);
        }

        if let Some(mode) = lookup("POSTERMAKER_MODE") {
            self.mode = Some(mode.parse()?);
        }

        if let Some(model) = lookup("POSTERMAKER_MODEL") {
            self.matte.model = self.matte.model.with_path(model);
        }

        if let Some(dir) = lookup("POSTERMAKER_STATIC_DIR") {
            self.static_dir = Some(PathBuf::from(dir));
        }

        Ok(self)
    }

    /// Effective removal mode
    ///
    /// An explicit mode always wins. Otherwise a configured API key selects
    /// proxy mode and its absence selects local mode.
    #[must_use]
    pub fn mode(&self) -> RemovalMode {
        match self.mode {
            Some(mode) => mode,
            None if self.remove_bg.has_api_key() => RemovalMode::Proxy,
            None => RemovalMode::Local,
        }
    }

    /// Socket address to bind
    ///
    /// # Errors
    /// Returns `MatteError::InvalidConfig` when host and port do not form an address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| MatteError::invalid_config(format!("Invalid bind address: {}", e)))
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - Zero upload limit
    /// - Invalid matting configuration in local mode
    pub fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(MatteError::invalid_config(
                "max_upload_bytes must be greater than zero",
            ));
        }
        if self.mode() == RemovalMode::Local {
            self.matte.validate()?;
        }
        self.socket_addr()?;
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: Self::DEFAULT_PORT,
            mode: None,
            max_upload_bytes: Self::DEFAULT_MAX_UPLOAD_BYTES,
            static_dir: Some(PathBuf::from("dist")),
            matte: MatteConfig::default(),
            remove_bg: RemoveBgConfig::default(),
        }
    }
}
