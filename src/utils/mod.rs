//! Utilities shared by the backends and the processor

pub mod preprocessing;

pub use preprocessing::ImagePreprocessor;
