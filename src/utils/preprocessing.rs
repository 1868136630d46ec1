//! Image to tensor conversion for model inference

use crate::{
    error::{MatteError, Result},
    models::{PreprocessingConfig, TensorLayout},
};
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array4;

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Turn an image into the model's input tensor
    ///
    /// The image is stretched to S×S without preserving aspect ratio; the
    /// compositor stretches the matte back, so the two distortions cancel.
    /// Channels are scaled to `[0, 1]` and then normalized per channel.
    ///
    /// # Errors
    /// - Image with a zero dimension
    /// - Model input size of zero
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<Array4<f32>> {
        let size = preprocessing_config.input_size;
        if size == 0 {
            return Err(MatteError::invalid_config("model input size must be positive"));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(MatteError::processing(format!(
                "cannot preprocess a {}x{} image",
                image.width(),
                image.height()
            )));
        }

        let rgb = image.to_rgb8();
        let resized = if rgb.dimensions() == (size, size) {
            rgb
        } else {
            image::imageops::resize(&rgb, size, size, FilterType::Triangle)
        };

        Ok(Self::to_tensor(&resized, preprocessing_config))
    }

    fn to_tensor(canvas: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
        let side = config.input_size as usize;
        let shape = config.layout.input_shape(side);
        let mut tensor = Array4::<f32>::zeros((shape[0], shape[1], shape[2], shape[3]));

        for (x, y, pixel) in canvas.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for channel in 0..3 {
                let value = (f32::from(pixel[channel]) / 255.0
                    - config.normalization_mean[channel])
                    / config.normalization_std[channel];
                let index = match config.layout {
                    TensorLayout::Nchw => [0, channel, y, x],
                    TensorLayout::Nhwc => [0, y, x, channel],
                };
                if let Some(cell) = tensor.get_mut(index) {
                    *cell = value;
                }
            }
        }

        tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn config(size: u32, layout: TensorLayout) -> PreprocessingConfig {
        PreprocessingConfig {
            input_size: size,
            layout,
            normalization_mean: [0.0; 3],
            normalization_std: [1.0; 3],
        }
    }

    #[test]
    fn test_stretches_to_model_size() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 16, Rgb([255, 0, 51])));
        let tensor =
            ImagePreprocessor::preprocess_for_inference(&image, &config(8, TensorLayout::Nchw))
                .unwrap();

        assert_eq!(tensor.dim(), (1, 3, 8, 8));
        assert!((tensor[[0, 0, 7, 7]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 1, 0, 0]].abs() < 1e-6);
        assert!((tensor[[0, 2, 3, 3]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_nhwc_layout_and_normalization() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([255, 255, 255])));
        let config = PreprocessingConfig {
            normalization_mean: [0.5, 0.5, 0.5],
            normalization_std: [0.5, 0.5, 0.5],
            ..config(4, TensorLayout::Nhwc)
        };
        let tensor = ImagePreprocessor::preprocess_for_inference(&image, &config).unwrap();

        assert_eq!(tensor.dim(), (1, 4, 4, 3));
        assert!(tensor.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_rejects_empty_image() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(0, 5));
        assert!(
            ImagePreprocessor::preprocess_for_inference(&image, &config(8, TensorLayout::Nchw))
                .is_err()
        );
    }
}
