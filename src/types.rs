//! Core data types for the matting pipeline

use crate::{
    config::OutputFormat,
    error::{MatteError, Result},
    matte::OrientationDecision,
    services::OutputFormatHandler,
};
use chrono::{DateTime, Utc};
use image::{GrayImage, Luma, RgbaImage};
use ndarray::Array4;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Raw per-cell foreground confidence from the segmentation model
///
/// Always square (S×S, row-major). Values are unconstrained but finite.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbabilityGrid {
    side: usize,
    values: Vec<f32>,
}

impl ProbabilityGrid {
    /// Create a grid from row-major values
    ///
    /// # Errors
    /// - `side` is zero
    /// - `values.len() != side * side`
    /// - Any value is NaN or infinite
    pub fn new(side: usize, values: Vec<f32>) -> Result<Self> {
        if side == 0 {
            return Err(MatteError::invalid_grid("grid side must be positive"));
        }
        if values.len() != side * side {
            return Err(MatteError::invalid_grid(format!(
                "expected {} values for a {}x{} grid, got {}",
                side * side,
                side,
                side,
                values.len()
            )));
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(MatteError::invalid_grid(format!(
                "non-finite value at cell {}",
                index
            )));
        }
        Ok(Self { side, values })
    }

    /// Create a grid from a flat buffer whose length is a perfect square
    ///
    /// # Errors
    /// - Length is zero or not a perfect square
    /// - Any value is NaN or infinite
    pub fn from_square_slice(values: &[f32]) -> Result<Self> {
        let side = (values.len() as f64).sqrt() as usize;
        if side * side != values.len() {
            return Err(MatteError::invalid_grid(format!(
                "{} values do not form a square grid",
                values.len()
            )));
        }
        Self::new(side, values.to_vec())
    }

    /// Create a grid from rows
    ///
    /// # Errors
    /// - Rows are ragged or their count differs from their length
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self> {
        let side = rows.len();
        if rows.iter().any(|row| row.as_ref().len() != side) {
            return Err(MatteError::invalid_grid(format!(
                "every row of a {}-row grid must hold {} values",
                side, side
            )));
        }
        let values = rows
            .iter()
            .flat_map(|row| row.as_ref().iter().copied())
            .collect();
        Self::new(side, values)
    }

    /// Extract the grid from a single-channel model output tensor
    ///
    /// Accepts `[1, 1, S, S]` and `[1, S, S, 1]`.
    ///
    /// # Errors
    /// - Any other tensor shape
    /// - Non-finite values
    pub fn from_tensor(tensor: &Array4<f32>) -> Result<Self> {
        let side = match tensor.dim() {
            (1, 1, h, w) | (1, h, w, 1) if h == w => h,
            (n, c, h, w) => {
                return Err(MatteError::invalid_grid(format!(
                    "expected a [1,1,S,S] or [1,S,S,1] tensor, got [{}, {}, {}, {}]",
                    n, c, h, w
                )));
            },
        };
        // Both accepted layouts store the S×S plane contiguously in logical order
        Self::new(side, tensor.iter().copied().collect())
    }

    #[must_use]
    pub fn side(&self) -> usize {
        self.side
    }

    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Value at column `x`, row `y`
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.side || y >= self.side {
            return None;
        }
        self.values.get(y * self.side + x).copied()
    }

    /// Grid with every value replaced by `1 - value`
    #[must_use]
    pub fn inverted(mut self) -> Self {
        for v in &mut self.values {
            *v = 1.0 - *v;
        }
        self
    }
}

/// Contrast-normalized matte, values in `[0, 1]`, same side as its source grid
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMatte {
    side: usize,
    values: Vec<f32>,
}

impl NormalizedMatte {
    pub(crate) fn from_normalized(side: usize, values: Vec<f32>) -> Self {
        debug_assert_eq!(values.len(), side * side);
        Self { side, values }
    }

    #[must_use]
    pub fn side(&self) -> usize {
        self.side
    }

    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.side || y >= self.side {
            return None;
        }
        self.values.get(y * self.side + x).copied()
    }

    /// Quantize to an 8-bit grayscale image (`round(v * 255)`)
    #[must_use]
    pub fn to_luma8(&self) -> GrayImage {
        let side = self.side as u32;
        GrayImage::from_fn(side, side, |x, y| {
            let v = self.values[(y as usize) * self.side + x as usize];
            Luma([(v.clamp(0.0, 1.0) * 255.0).round() as u8])
        })
    }

    #[must_use]
    pub fn statistics(&self) -> MatteStatistics {
        let total_cells = self.values.len();
        let foreground_cells = self.values.iter().filter(|&&v| v >= 0.5).count();
        let mean = if total_cells == 0 {
            0.0
        } else {
            self.values.iter().map(|&v| f64::from(v)).sum::<f64>() / total_cells as f64
        };

        MatteStatistics {
            total_cells,
            foreground_cells,
            foreground_ratio: if total_cells == 0 {
                0.0
            } else {
                foreground_cells as f32 / total_cells as f32
            },
            mean_opacity: mean as f32,
        }
    }
}

/// Summary of a matte
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatteStatistics {
    pub total_cells: usize,
    /// Cells with opacity of at least 0.5
    pub foreground_cells: usize,
    pub foreground_ratio: f32,
    pub mean_opacity: f32,
}

/// Cutout at the source resolution: source RGB, matte alpha
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeResult {
    image: RgbaImage,
}

impl CompositeResult {
    pub(crate) fn new(image: RgbaImage) -> Self {
        Self { image }
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[must_use]
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Alpha channel as a grayscale image
    #[must_use]
    pub fn alpha_mask(&self) -> GrayImage {
        let (width, height) = self.image.dimensions();
        GrayImage::from_fn(width, height, |x, y| Luma([self.image.get_pixel(x, y)[3]]))
    }

    /// Encode in the given format
    ///
    /// # Errors
    /// - Encoder failure
    pub fn to_bytes(&self, format: OutputFormat) -> Result<Vec<u8>> {
        OutputFormatHandler::encode(&self.image, format)
    }

    /// Save as PNG with alpha channel
    ///
    /// # Errors
    /// - File cannot be written
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.image.save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }

    /// Save the alpha channel at full resolution as a grayscale PNG
    ///
    /// # Errors
    /// - File cannot be written
    pub fn save_alpha_mask<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.alpha_mask()
            .save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }
}

/// Detailed timing breakdown for one local removal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Image decoding (zero when the caller supplied a decoded image)
    pub decode_ms: u64,
    /// Resize and tensor conversion
    pub preprocessing_ms: u64,
    /// Model execution
    pub inference_ms: u64,
    /// Orientation correction, normalization and compositing
    pub postprocessing_ms: u64,
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Total: {}ms | Decode: {}ms | Preprocess: {}ms | Inference: {}ms | Postprocess: {}ms",
            self.total_ms,
            self.decode_ms,
            self.preprocessing_ms,
            self.inference_ms,
            self.postprocessing_ms
        )
    }
}

/// Outcome of running the local pipeline on one image
#[derive(Debug, Clone)]
pub struct RemovalResult {
    pub composite: CompositeResult,
    pub matte: NormalizedMatte,
    pub orientation: OrientationDecision,
    pub timings: ProcessingTimings,
    pub model_name: String,
    pub processed_at: DateTime<Utc>,
}

impl RemovalResult {
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.composite.dimensions()
    }

    /// Encode the cutout
    ///
    /// # Errors
    /// - Encoder failure
    pub fn to_bytes(&self, format: OutputFormat) -> Result<Vec<u8>> {
        self.composite.to_bytes(format)
    }
}
