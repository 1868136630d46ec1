//! Output format handling service

use crate::{config::OutputFormat, error::Result};
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;

/// Encodes cutouts and describes the output formats
pub struct OutputFormatHandler;

impl OutputFormatHandler {
    /// Encode an RGBA image
    ///
    /// `Rgba8` returns the raw pixel buffer, 4 bytes per pixel, row-major.
    ///
    /// # Errors
    /// - Encoder failure
    ///
    /// # Examples
    /// ```rust
    /// use postermaker::{config::OutputFormat, services::OutputFormatHandler};
    /// use image::RgbaImage;
    ///
    /// let image = RgbaImage::new(2, 2);
    /// let raw = OutputFormatHandler::encode(&image, OutputFormat::Rgba8)?;
    /// assert_eq!(raw.len(), 16);
    /// # Ok::<(), postermaker::MatteError>(())
    /// ```
    pub fn encode(image: &RgbaImage, format: OutputFormat) -> Result<Vec<u8>> {
        let image_format = match format {
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Tiff => ImageFormat::Tiff,
            OutputFormat::Rgba8 => return Ok(image.as_raw().clone()),
        };

        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, image_format)?;
        Ok(buffer.into_inner())
    }

    /// MIME type for HTTP responses
    #[must_use]
    pub fn content_type(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "image/png",
            OutputFormat::Tiff => "image/tiff",
            OutputFormat::Rgba8 => "application/octet-stream",
        }
    }

    /// File extension without the dot
    #[must_use]
    pub fn extension(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Png => "png",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Rgba8 => "raw",
        }
    }

    /// Output format implied by a file extension, if any
    #[must_use]
    pub fn from_extension(extension: &str) -> Option<OutputFormat> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(OutputFormat::Png),
            "tif" | "tiff" => Some(OutputFormat::Tiff),
            "raw" | "rgba" => Some(OutputFormat::Rgba8),
            _ => None,
        }
    }
}
