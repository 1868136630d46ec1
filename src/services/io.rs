//! Image decoding and file input/output

use crate::{
    config::OutputFormat,
    error::{MatteError, Result},
    services::OutputFormatHandler,
    types::CompositeResult,
};
use image::DynamicImage;
use std::path::Path;

/// Service for reading and writing images
pub struct ImageIOService;

impl ImageIOService {
    /// Decode an uploaded image, detecting the format from its content
    ///
    /// # Errors
    /// - Empty input
    /// - Unknown or corrupt image data
    pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(MatteError::decode("empty image data"));
        }
        image::load_from_memory(bytes).map_err(|e| {
            MatteError::decode(format!("failed to decode {} bytes: {}", bytes.len(), e))
        })
    }

    /// Load an image from disk
    ///
    /// Falls back to content sniffing when the extension is wrong or missing.
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Content is not a supported image
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(MatteError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );
                let data = std::fs::read(path_ref)
                    .map_err(|io_err| MatteError::file_io_error("read image data", path_ref, &io_err))?;
                Self::decode_bytes(&data)
            },
        }
    }

    /// Write an encoded cutout, creating parent directories as needed
    ///
    /// # Errors
    /// - Directory creation or write failure
    /// - Encoder failure
    pub fn save_image<P: AsRef<Path>>(
        result: &CompositeResult,
        path: P,
        format: OutputFormat,
    ) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| MatteError::file_io_error("create output directory", parent, &e))?;
        }

        let bytes = OutputFormatHandler::encode(result.image(), format)?;
        std::fs::write(path_ref, bytes)
            .map_err(|e| MatteError::file_io_error("write output image", path_ref, &e))?;

        log::debug!("Saved {:?} cutout to {}", format, path_ref.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_bytes(image: &RgbaImage) -> Vec<u8> {
        OutputFormatHandler::encode(image, OutputFormat::Png).unwrap()
    }

    #[test]
    fn test_decode_bytes() {
        let image = RgbaImage::from_pixel(4, 3, Rgba([200, 100, 50, 255]));
        let decoded = ImageIOService::decode_bytes(&png_bytes(&image)).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));

        assert!(matches!(
            ImageIOService::decode_bytes(&[]),
            Err(MatteError::Decode(_))
        ));
        assert!(matches!(
            ImageIOService::decode_bytes(b"not an image at all"),
            Err(MatteError::Decode(_))
        ));
    }

    #[test]
    fn test_load_with_misleading_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        let image = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]));
        std::fs::write(&path, png_bytes(&image)).unwrap();

        let loaded = ImageIOService::load_image(&path).unwrap();
        assert_eq!(loaded.to_rgba8(), image);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ImageIOService::load_image("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, MatteError::Io(_)));
    }

    #[test]
    fn test_save_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.png");
        let result = CompositeResult::new(RgbaImage::from_pixel(2, 2, Rgba([9, 9, 9, 0])));

        ImageIOService::save_image(&result, &path, OutputFormat::Png).unwrap();
        let reloaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(&reloaded, result.image());
    }
}
