//! Applies a normalized matte to the source image as its alpha channel

use crate::{
    config::ResampleFilter,
    types::{CompositeResult, NormalizedMatte},
};
use image::{DynamicImage, GrayImage};

/// Composite with bilinear matte upsampling
#[must_use]
pub fn composite(source: &DynamicImage, matte: &NormalizedMatte) -> CompositeResult {
    composite_with_filter(source, matte, ResampleFilter::Bilinear)
}

/// Stretch the matte to the source size and use it as alpha
///
/// RGB is copied unchanged; any alpha the source had is replaced. Sources
/// with other channel layouts or bit depths are converted to RGBA8 first.
#[must_use]
pub fn composite_with_filter(
    source: &DynamicImage,
    matte: &NormalizedMatte,
    filter: ResampleFilter,
) -> CompositeResult {
    let mut rgba = source.to_rgba8();
    let (width, height) = rgba.dimensions();
    let alpha = resample_matte(matte, width, height, filter);

    for (pixel, a) in rgba.pixels_mut().zip(alpha.pixels()) {
        pixel[3] = a[0];
    }

    CompositeResult::new(rgba)
}

/// Matte quantized to 8 bits and resized to `width`×`height`
#[must_use]
pub fn resample_matte(
    matte: &NormalizedMatte,
    width: u32,
    height: u32,
    filter: ResampleFilter,
) -> GrayImage {
    if width == 0 || height == 0 {
        return GrayImage::new(width, height);
    }
    let quantized = matte.to_luma8();
    if quantized.dimensions() == (width, height) {
        return quantized;
    }
    image::imageops::resize(&quantized, width, height, filter.into())
}
